use std::error::Error;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast::Receiver;
use tokio::{signal, time};

use futures::future;
use futures::stream::{FuturesUnordered, StreamExt};

use hyper::server::conn::Http;
use hyper::service::Service;
use hyper::{Body, Request, Response};

use log::{debug, info};

use crate::shutdown::Shutdown;

pub struct Server<A, S> {
    addr: A,
    max_connections: usize,
    http: Http,
    shutdown: Shutdown,
    service: S,
}

pub struct Builder<A> {
    addr: A,
    max_connections: usize,
    http: Http,
    shutdown: Shutdown,
}

impl<A> Builder<A>
where
    A: ToSocketAddrs,
{
    pub fn max_connections(mut self, num: usize) -> Self {
        self.max_connections = num;
        self
    }

    pub fn http2_only(mut self, val: bool) -> Self {
        self.http.http2_only(val);
        self
    }

    /// Shares the process-wide shutdown handle. The server both observes it
    /// (stop accepting, drain connections) and triggers it (Ctrl-C).
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn service<S>(self, service: S) -> Server<A, S> {
        Server {
            addr: self.addr,
            max_connections: self.max_connections,
            http: self.http,
            shutdown: self.shutdown,
            service,
        }
    }
}

impl<A> Server<A, ()> {
    const DEFAULT_MAX_CONNECTIONS: usize = 25_000;

    pub fn bind(addrs: A) -> Builder<A> {
        Builder {
            addr: addrs,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            http: Http::new(),
            shutdown: Shutdown::new(),
        }
    }
}

impl<A, S> Server<A, S>
where
    A: ToSocketAddrs + 'static,
    S: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    S::Error: Error + Send + Sync,
    S::Future: Send,
{
    const DEFAULT_SHUTDOWN_DELAY: Duration = Duration::from_secs(5);

    async fn process_stream(stream: TcpStream, http: Http, service: S, mut shutdown: Receiver<()>) {
        let connection = http.serve_connection(stream, service);

        let shutdown_signal = shutdown.recv();

        tokio::pin!(connection);

        let result = tokio::select! {
            r = connection.as_mut() => r,
            _ = shutdown_signal => {
                connection.as_mut().graceful_shutdown();
                connection.await
            }
        };

        if let Err(e) = result {
            debug!("connection closed with an error: {}", e);
        }
    }

    /// Binds the address and serves until Ctrl-C or the shutdown handle
    /// fires.
    pub async fn run(self) {
        let Server {
            addr,
            max_connections,
            http,
            shutdown,
            service,
        } = self;

        let listener = TcpListener::bind(addr)
            .await
            .expect("Can't bind to the address.");

        Self::accept_loop(listener, max_connections, http, shutdown, service).await
    }

    /// Serves on an already-bound listener. Split out from `run` for
    /// callers that bind port 0 and need the local address first.
    pub async fn serve(self, listener: TcpListener) {
        let Server {
            max_connections,
            http,
            shutdown,
            service,
            ..
        } = self;

        Self::accept_loop(listener, max_connections, http, shutdown, service).await
    }

    async fn accept_loop(
        listener: TcpListener,
        max_connections: usize,
        http: Http,
        shutdown: Shutdown,
        service: S,
    ) {
        let mut jhs = FuturesUnordered::new();
        let mut stop = shutdown.subscribe();

        while !shutdown.is_triggered() {
            tokio::select! {
                Ok((stream, _)) = listener.accept(), if jhs.len() < max_connections => {
                    jhs.push(tokio::spawn(Self::process_stream(stream, http.clone(), service.clone(), shutdown.subscribe())));
                },
                _ = jhs.next(), if !jhs.is_empty() => {},
                _ = stop.recv() => break,
                _ = signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                },
                else => break,
            }
        }

        shutdown.trigger();

        let _ = time::timeout(Self::DEFAULT_SHUTDOWN_DELAY, future::join_all(jhs)).await;
    }
}
