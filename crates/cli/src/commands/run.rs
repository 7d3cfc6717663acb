use crate::state::replay_policy;
use anyhow::{Context, Result};
use ghostcache_aof::{initialize_persistence, PersistenceConfigLoader, PersistenceHandle};
use ghostcache_cache::LruCache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub struct RunOptions {
    pub dir: Option<PathBuf>,
    pub max_size: Option<u64>,
    pub flush_interval_ms: Option<u64>,
    pub capacity: usize,
    pub skip_corrupt: bool,
}

/// One parsed stdin command
#[derive(Debug, PartialEq, Eq)]
enum Request {
    Put {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Add {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Get(String),
    Delete(String),
    Flush,
    Compact,
    Stats,
}

fn parse_request(line: &str) -> Result<Request, String> {
    let mut parts = line.split_whitespace();
    let command = parts.next().ok_or("empty command")?;
    let mut arg = |name: &str| {
        parts
            .next()
            .map(str::to_string)
            .ok_or(format!("{command}: missing {name}"))
    };

    let request = match command {
        "put" | "set" | "add" => {
            let key = arg("key")?;
            let value = arg("value")?;
            let ttl = match parts.next() {
                Some(raw) => Some(Duration::from_secs(
                    raw.parse().map_err(|e| format!("{command}: bad ttl '{raw}': {e}"))?,
                )),
                None => None,
            };
            if command == "add" {
                Request::Add { key, value, ttl }
            } else {
                Request::Put { key, value, ttl }
            }
        }
        "get" => Request::Get(arg("key")?),
        "del" | "delete" => Request::Delete(arg("key")?),
        "flush" => Request::Flush,
        "compact" => Request::Compact,
        "stats" => Request::Stats,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(request)
}

async fn handle(
    cache: &LruCache,
    persistence: &PersistenceHandle,
    request: Request,
) -> Result<String> {
    let reply = match request {
        Request::Put { key, value, ttl } => {
            cache.put(key, value, ttl);
            "OK".to_string()
        }
        Request::Add { key, value, ttl } => {
            if cache.add(key, value, ttl) {
                "OK".to_string()
            } else {
                "EXISTS".to_string()
            }
        }
        Request::Get(key) => cache.get(&key).unwrap_or_else(|| "(nil)".to_string()),
        Request::Delete(key) => {
            if cache.delete(&key) {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        Request::Flush => {
            cache.flush();
            "OK".to_string()
        }
        Request::Compact => {
            let manager = persistence.manager().clone();
            let report = tokio::task::spawn_blocking(move || manager.compact_now()).await??;
            format!(
                "compacted {} -> {} bytes, {} live keys",
                report.bytes_before, report.bytes_after, report.live_keys
            )
        }
        Request::Stats => serde_json::to_string(&persistence.stats())?,
    };
    Ok(reply)
}

pub async fn execute(options: RunOptions) -> Result<()> {
    let mut config = PersistenceConfigLoader::load().context("failed to load persistence config")?;
    if let Some(dir) = options.dir {
        config.log_dir = dir;
    }
    if let Some(max_size) = options.max_size {
        config.max_log_size = max_size;
    }
    if let Some(millis) = options.flush_interval_ms {
        config.flush_interval = Duration::from_millis(millis);
    }
    if options.skip_corrupt {
        config.replay_policy = replay_policy(true);
    }

    let cache = Arc::new(LruCache::new(options.capacity));
    let persistence = initialize_persistence(cache.clone(), config)
        .await
        .context("failed to start persistence")?;
    tracing::info!(
        "Node ready with {} keys restored, reading commands from stdin",
        cache.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match parse_request(&line) {
                    Ok(request) => match handle(&cache, &persistence, request).await {
                        Ok(reply) => reply,
                        Err(e) => format!("ERR {e:#}"),
                    },
                    Err(e) => format!("ERR {e}"),
                };
                stdout.write_all(reply.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let stats = persistence.shutdown().await?;
    tracing::info!(
        "Shut down cleanly: {} records in {} ticks, {} compactions",
        stats.entries_appended,
        stats.ticks,
        stats.compactions
    );
    Ok(())
}
