use std::env;
use std::time::Duration;

use hellothreads::client;

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let n = match env::args().nth(1).and_then(|n| n.parse::<usize>().ok()) {
        Some(n) => {
            if n > 0 && n <= 1000 {
                n
            } else {
                eprintln!("The request count must be between 1 and 1000.");
                std::process::exit(0);
            }
        }
        None => {
            eprintln!("Usage: client <request-count>");
            std::process::exit(0);
        }
    };

    let c = client::Config {
        uri: "http://127.0.0.1:8080/hello".parse().unwrap(),
        request_count: n,
        waiting: Duration::from_secs(5),
        http2_only: false,
    };

    let summary = client::run(c).await;
    summary.print();
}
