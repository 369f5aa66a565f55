use crate::http::make_boxed_error_response;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

/// Liveness and readiness probes, served on the admin listener.
///
/// `/health` always answers `ok`. `/ready` answers `ok` once `is_ready`
/// returns true and 503 before that.
pub struct AdminService<F> {
    is_ready: F,
}

impl<F> AdminService<F>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F) -> Self {
        Self { is_ready }
    }
}

impl<B, F> Service<Request<B>> for AdminService<F>
where
    F: Fn() -> bool,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let is_ready = (self.is_ready)();
        let path = req.uri().path().to_owned();

        Box::pin(async move {
            let ok_body = || Full::new(Bytes::from("ok\n")).boxed();

            let res = match path.as_str() {
                "/health" => Response::new(ok_body()),
                "/ready" => match is_ready {
                    true => Response::new(ok_body()),
                    false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
                },
                _ => make_boxed_error_response(StatusCode::NOT_FOUND),
            };
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn get(svc: &AdminService<impl Fn() -> bool>, path: &str) -> (StatusCode, Bytes) {
        let req = Request::builder().uri(path).body(()).unwrap();
        let response = svc.call(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test]
    async fn test_probes() {
        let ready = Arc::new(AtomicBool::new(false));
        let ready_probe = ready.clone();
        let svc = AdminService::new(move || ready_probe.load(Ordering::Relaxed));

        assert_eq!(get(&svc, "/health").await, (StatusCode::OK, Bytes::from("ok\n")));
        assert_eq!(get(&svc, "/ready").await.0, StatusCode::SERVICE_UNAVAILABLE);

        ready.store(true, Ordering::Relaxed);
        assert_eq!(get(&svc, "/ready").await, (StatusCode::OK, Bytes::from("ok\n")));

        assert_eq!(get(&svc, "/metrics").await.0, StatusCode::NOT_FOUND);
    }
}
