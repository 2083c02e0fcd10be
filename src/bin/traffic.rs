use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "traffic")]
#[command(about = "Drive simulated user traffic against the demo service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Concurrent simulated users
    #[arg(long, default_value_t = 10)]
    users: usize,

    #[arg(long, default_value_t = 60)]
    duration_secs: u64,

    #[arg(long, default_value_t = 1000)]
    min_wait_ms: u64,

    #[arg(long, default_value_t = 3000)]
    max_wait_ms: u64,
}

#[derive(Debug, Clone, Copy)]
enum Task {
    Items,
    Health,
    Crash,
}

impl Task {
    const WEIGHTED: [(Task, u32); 3] = [(Task::Items, 5), (Task::Health, 2), (Task::Crash, 1)];

    fn pick(rng: &mut fastrand::Rng) -> Task {
        let total: u32 = Self::WEIGHTED.iter().map(|(_, weight)| weight).sum();
        let mut roll = rng.u32(0..total);
        for (task, weight) in Self::WEIGHTED {
            if roll < weight {
                return task;
            }
            roll -= weight;
        }
        Task::Items
    }

    fn name(&self) -> &'static str {
        match self {
            Task::Items => "items",
            Task::Health => "health",
            Task::Crash => "crash",
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    requests: u64,
    failures: u64,
    tasks: BTreeMap<&'static str, u64>,
}

async fn get(client: &reqwest::Client, url: &str, expect_error: bool) -> bool {
    match client.get(url).send().await {
        Ok(response) if expect_error => response.status().as_u16() == 500,
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

async fn run_user(
    client: reqwest::Client,
    base: String,
    deadline: Instant,
    wait: (u64, u64),
    summary: Arc<Mutex<Summary>>,
) {
    let mut rng = fastrand::Rng::new();
    while Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(rng.u64(wait.0..=wait.1))).await;

        let task = Task::pick(&mut rng);
        let outcomes = match task {
            Task::Items => vec![
                get(&client, &format!("{}/items/1", base), false).await,
                get(&client, &format!("{}/items/2", base), false).await,
            ],
            Task::Health => vec![get(&client, &format!("{}/health", base), false).await],
            // A 500 is the expected answer.
            Task::Crash => vec![get(&client, &format!("{}/crash", base), true).await],
        };

        let mut summary = summary.lock().await;
        *summary.tasks.entry(task.name()).or_default() += 1;
        summary.requests += outcomes.len() as u64;
        summary.failures += outcomes.iter().filter(|ok| !**ok).count() as u64;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let base = cli.url.trim_end_matches('/').to_string();
    let deadline = Instant::now() + Duration::from_secs(cli.duration_secs);
    let wait = (cli.min_wait_ms, cli.max_wait_ms.max(cli.min_wait_ms));
    let summary = Arc::new(Mutex::new(Summary::default()));

    let users: Vec<_> = (0..cli.users)
        .map(|_| {
            tokio::spawn(run_user(
                client.clone(),
                base.clone(),
                deadline,
                wait,
                summary.clone(),
            ))
        })
        .collect();

    for user in users {
        user.await?;
    }

    let summary = summary.lock().await;
    println!("{}", serde_json::to_string_pretty(&*summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_mix_follows_weights() {
        let mut rng = fastrand::Rng::with_seed(7);
        let draws = 80_000;
        let mut counts: BTreeMap<&'static str, u32> = BTreeMap::new();
        for _ in 0..draws {
            *counts.entry(Task::pick(&mut rng).name()).or_default() += 1;
        }

        for (task, weight) in Task::WEIGHTED {
            let expected = draws as f64 * weight as f64 / 8.0;
            let observed = counts.get(task.name()).copied().unwrap_or(0) as f64;
            assert!(
                (observed - expected).abs() < expected * 0.05,
                "{}: observed {} expected {}",
                task.name(),
                observed,
                expected
            );
        }
    }
}
