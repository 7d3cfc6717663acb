use anyhow::{Context, Result};
use ghostcache_aof::format::{self, Record};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Read-only summary of a log file
#[derive(Debug, Default, Serialize)]
pub struct LogSummary {
    pub path: PathBuf,
    pub size: u64,
    pub created: Option<String>,
    pub records: usize,
    pub verbs: BTreeMap<String, usize>,
    pub distinct_keys: usize,
    pub corrupt_lines: Vec<usize>,
    pub torn_tail: bool,
}

pub fn summarize(path: &Path) -> Result<LogSummary> {
    let file = File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
    let size = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut summary = LogSummary {
        path: path.to_path_buf(),
        size,
        ..LogSummary::default()
    };
    let mut keys = BTreeSet::new();
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let complete = buf.last() == Some(&b'\n');
        let line = String::from_utf8_lossy(&buf);
        if line.trim().is_empty() {
            continue;
        }

        match format::decode_line(&line) {
            Ok(Record::Header { created }) if line_no == 1 => summary.created = Some(created),
            Ok(Record::Header { .. }) => summary.corrupt_lines.push(line_no),
            Ok(Record::Entry(entry)) => {
                summary.records += 1;
                *summary
                    .verbs
                    .entry(entry.verb.as_str().to_string())
                    .or_default() += 1;
                if !entry.key.is_empty() {
                    keys.insert(entry.key);
                }
            }
            Err(_) if !complete => summary.torn_tail = true,
            Err(_) => summary.corrupt_lines.push(line_no),
        }
    }

    summary.distinct_keys = keys.len();
    Ok(summary)
}

pub fn execute(path: &Path, json: bool) -> Result<()> {
    let summary = summarize(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("log:           {}", summary.path.display());
    println!("size:          {} bytes", summary.size);
    println!(
        "created:       {}",
        summary.created.as_deref().unwrap_or("(no header)")
    );
    println!("records:       {}", summary.records);
    for (verb, count) in &summary.verbs {
        println!("  {verb:<12} {count}");
    }
    println!("distinct keys: {}", summary.distinct_keys);
    if !summary.corrupt_lines.is_empty() {
        println!("corrupt lines: {:?}", summary.corrupt_lines);
    }
    if summary.torn_tail {
        println!("torn tail:     yes (dropped on next replay)");
    }
    Ok(())
}
