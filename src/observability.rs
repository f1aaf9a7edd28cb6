use crate::config::{LogFormat, LogRotation, LoggingConfig};
use axum::http::{HeaderMap, HeaderValue};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

static FILE_LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn extract_or_generate_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| is_valid_request_id(value))
        .map(ToString::to_string)
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string())
}

pub fn insert_request_id_header(headers: &mut HeaderMap, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
}

pub fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(logging.level.trim()).map_err(|err| {
        format!(
            "invalid `observability.logging.level` value `{}`: {err}",
            logging.level
        )
    })?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if logging.to_stdout {
        layers.push(format_layer(&logging.format, io::stdout, true));
    }

    let mut pruned = 0;
    let file_sink = match logging.file.as_ref().filter(|file| file.enabled) {
        Some(file) => {
            let dir = Path::new(file.dir.trim());
            std::fs::create_dir_all(dir).map_err(|err| {
                format!("failed to create log directory `{}`: {err}", dir.display())
            })?;
            pruned = prune_rotated_logs(dir, file.prefix.trim(), file.max_files).map_err(
                |err| format!("failed to prune log directory `{}`: {err}", dir.display()),
            )?;

            let appender =
                RollingFileAppender::new(rotation_for(&file.rotation), dir, file.prefix.trim());
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_LOG_GUARD.set(guard);
            layers.push(format_layer(&logging.format, writer, false));
            Some(dir.to_path_buf())
        }
        None => None,
    };

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(env_filter).with(layers),
    )
    .map_err(|err| format!("failed to initialize tracing subscriber: {err}"))?;
    let _ = TRACING_INITIALIZED.set(());

    if let Some(dir) = file_sink {
        tracing::debug!(dir = %dir.display(), pruned, "file logging enabled");
    }
    Ok(())
}

fn format_layer<W>(format: &LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

fn rotation_for(rotation: &LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

// Keeps the `keep` newest files starting with `prefix`; returns how many were removed.
fn prune_rotated_logs(dir: &Path, prefix: &str, keep: usize) -> io::Result<usize> {
    let mut logs: Vec<(PathBuf, SystemTime)> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (entry.path(), modified)
        })
        .collect();

    logs.sort_by(|left, right| right.1.cmp(&left.1));
    let stale: Vec<PathBuf> = logs.into_iter().skip(keep).map(|(path, _)| path).collect();
    for path in &stale {
        std::fs::remove_file(path)?;
    }
    Ok(stale.len())
}

fn is_valid_request_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}
