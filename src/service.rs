use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::Service;
use hyper::{Body, Method, Request, Response, StatusCode};

use futures::future;

use crate::executor::Executor;

pub const HELLO_PATH: &str = "/hello";
pub const HELLO_BODY: &str = "Hello world";

/// Latency floor of the hello handler.
pub const HANDLER_SLEEP: Duration = Duration::from_millis(1000);

/// Routing service for the demo surface: `GET /hello` plus the default 404.
/// Cloned per connection; the executor behind it is shared and only ever
/// dispatched to.
#[derive(Clone)]
pub struct HelloService {
    executor: Arc<Executor>,
    sleep: Duration,
}

impl HelloService {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            sleep: HANDLER_SLEEP,
        }
    }

    /// Overrides the wait duration. The HTTP contract stays at the default
    /// 1000 ms; tests shorten it.
    pub fn sleep(mut self, duration: Duration) -> Self {
        self.sleep = duration;
        self
    }
}

impl Service<Request<Body>> for HelloService {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        match (req.method(), req.uri().path()) {
            (&Method::GET, HELLO_PATH) => {
                let executor = Arc::clone(&self.executor);
                let sleep = self.sleep;
                Box::pin(async move { Ok(hello(executor, sleep).await) })
            }
            _ => Box::pin(future::ready(Ok(not_found()))),
        }
    }
}

async fn hello(executor: Arc<Executor>, sleep: Duration) -> Response<Body> {
    match executor.dispatch_wait(sleep).await {
        Ok(()) => {
            let mut response = Response::new(Body::from(HELLO_BODY));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            response
        }
        // The only failure is a shutdown-interrupted wait; the request must
        // fail rather than complete.
        Err(_) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::executor::ExecutorConfig;
    use crate::shutdown::Shutdown;

    fn service(config: ExecutorConfig, sleep: Duration) -> HelloService {
        let executor = Arc::new(Executor::new(config, Shutdown::new()));
        HelloService::new(executor).sleep(sleep)
    }

    #[tokio::test]
    async fn hello_answers_with_the_fixed_body() {
        let mut service = service(ExecutorConfig::PerTask, Duration::from_millis(10));

        let req = Request::get(HELLO_PATH).body(Body::empty()).unwrap();
        let response = service.call(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], HELLO_BODY.as_bytes());
    }

    #[tokio::test]
    async fn unmapped_paths_get_the_default_not_found() {
        let mut service = service(ExecutorConfig::PerTask, Duration::from_millis(10));

        let req = Request::get("/goodbye").body(Body::empty()).unwrap();
        let response = service.call(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_get_methods_on_the_hello_path_are_unmapped() {
        let mut service = service(ExecutorConfig::PerTask, Duration::from_millis(10));

        let req = Request::post(HELLO_PATH).body(Body::empty()).unwrap();
        let response = service.call(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn an_interrupted_wait_fails_the_request() {
        let shutdown = Shutdown::new();
        let executor = Arc::new(Executor::new(ExecutorConfig::PerTask, shutdown.clone()));
        let mut service = HelloService::new(executor).sleep(Duration::from_secs(30));

        shutdown.trigger();

        let req = Request::get(HELLO_PATH).body(Body::empty()).unwrap();
        let response = service.call(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert!(body.is_empty());
    }
}
