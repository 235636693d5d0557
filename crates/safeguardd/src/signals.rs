//! NDJSON signal stream reader

use safeguard_api::SignalRecord;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where signal records come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalSource {
    Stdin,
    File(PathBuf),
}

impl SignalSource {
    /// `-` means standard input
    pub fn from_arg(arg: &Path) -> Self {
        if arg.as_os_str() == "-" {
            SignalSource::Stdin
        } else {
            SignalSource::File(arg.to_path_buf())
        }
    }
}

/// Forward every record from `reader` to `tx`.
///
/// `wait` records are served here by sleeping, so the engine keeps ticking
/// in between. Malformed lines are logged and skipped. Returns the number of
/// records forwarded.
pub async fn read_records<R>(reader: R, tx: mpsc::UnboundedSender<SignalRecord>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0;
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let record = match SignalRecord::parse_line(line_no, &line) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Skipping malformed signal record");
                continue;
            }
        };

        if let SignalRecord::Wait { ms } = record {
            debug!(ms, "Waiting");
            tokio::time::sleep(Duration::from_millis(ms)).await;
            continue;
        }

        if tx.send(record).is_err() {
            debug!("Service loop gone, stopping signal reader");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}

/// Spawn the reader task. The channel closes when the input ends.
pub fn spawn_reader(
    source: SignalSource,
    tx: mpsc::UnboundedSender<SignalRecord>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let result = match &source {
            SignalSource::Stdin => read_records(BufReader::new(tokio::io::stdin()), tx).await,
            SignalSource::File(path) => match tokio::fs::File::open(path).await {
                Ok(file) => read_records(BufReader::new(file), tx).await,
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(count) => info!(source = ?source, records = count, "Signal stream ended"),
            Err(e) => warn!(source = ?source, error = %e, "Signal stream failed"),
        }
    })
}
