use std::time::{Duration, Instant};

use hyper::body::Body;
use hyper::client::connect::HttpConnector;
use hyper::client::Client;
use hyper::{StatusCode, Uri};

use futures::stream::{FuturesUnordered, StreamExt};

use tokio::time;

pub struct Config {
    pub uri: Uri,
    pub request_count: usize,
    pub waiting: Duration,
    pub http2_only: bool,
}

/// Latency summary of one load run. The interesting comparison is
/// `total_duration`: N one-second requests take about one second under
/// per-task workers and about N / pool-size seconds under a saturated pool.
pub struct Summary {
    pub response_count: usize,
    pub min_duration: Duration,
    pub avg_duration: Duration,
    pub max_duration: Duration,
    pub total_duration: Duration,
}

impl Summary {
    pub fn print(&self) {
        println!(
            "\n\
            --- Load summary ---\n\
            Responses received - {}\n\
            Minimum response latency - {} ms\n\
            Average response latency - {} ms\n\
            Maximum response latency - {} ms\n\
            Total wall-clock time - {} ms",
            self.response_count,
            self.min_duration.as_millis(),
            self.avg_duration.as_millis(),
            self.max_duration.as_millis(),
            self.total_duration.as_millis()
        );
    }
}

/// Fires `request_count` concurrent GETs at `uri` and collects per-response
/// latencies. A request only counts when it answers 200; `waiting` bounds
/// the wait for the first response.
pub async fn run(
    Config {
        uri,
        request_count,
        waiting,
        http2_only,
    }: Config,
) -> Summary {
    let client = Client::builder().http2_only(http2_only).build_http::<Body>();

    let mut durations = Vec::with_capacity(request_count);

    let mut futs = FuturesUnordered::new();
    for _ in 0..request_count {
        futs.push(measure_response_time(client.clone(), uri.clone()));
    }

    let timei = Instant::now();

    if let Ok(Some(first)) = time::timeout(waiting, futs.next()).await {
        if let Some(d) = first {
            durations.push(d);
        }
        while let Some(result) = futs.next().await {
            if let Some(d) = result {
                durations.push(d);
            }
        }
    }

    let total_duration = timei.elapsed();
    let sum = durations.iter().sum::<Duration>();

    Summary {
        response_count: durations.len(),
        min_duration: durations.iter().min().copied().unwrap_or(Duration::ZERO),
        avg_duration: if durations.is_empty() {
            Duration::ZERO
        } else {
            sum / durations.len() as u32
        },
        max_duration: durations.iter().max().copied().unwrap_or(Duration::ZERO),
        total_duration,
    }
}

async fn measure_response_time(client: Client<HttpConnector>, uri: Uri) -> Option<Duration> {
    let timei = Instant::now();
    match client.get(uri).await {
        Ok(response) if response.status() == StatusCode::OK => Some(timei.elapsed()),
        _ => None,
    }
}
