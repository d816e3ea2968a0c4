use std::env;
use std::sync::Arc;

use log::info;

use hellothreads::executor::{select_executor, Executor};
use hellothreads::server::Server;
use hellothreads::service::HelloService;
use hellothreads::shutdown::Shutdown;

const ADDR: &str = "127.0.0.1:8080";
const VIRTUAL_THREADS_PROFILE: &str = "virtual-threads";

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let profile = env::args().nth(1).or_else(|| env::var("DEMO_PROFILE").ok());
    let virtual_threads = match profile.as_deref() {
        Some(VIRTUAL_THREADS_PROFILE) => true,
        None => false,
        Some(other) => {
            eprintln!(
                "Unknown profile '{}'. The only recognized profile is '{}'.",
                other, VIRTUAL_THREADS_PROFILE
            );
            std::process::exit(0);
        }
    };

    let config = select_executor(virtual_threads);
    info!("starting with {:?} on {}", config, ADDR);

    let shutdown = Shutdown::new();
    let executor = Arc::new(Executor::new(config, shutdown.clone()));
    let service = HelloService::new(executor);

    let server = Server::bind(ADDR)
        .max_connections(10_000)
        .shutdown(shutdown)
        .service(service);

    server.run().await
}
