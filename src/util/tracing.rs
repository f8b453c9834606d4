//! Tracing helpers
// (c) 2024 Ross Younger

use std::{
    fs::File,
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Context as _;
use serde::Serialize;
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        MakeWriter,
        time::{ChronoLocal, ChronoUtc},
    },
    prelude::*,
};

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

const FRIENDLY_FORMAT_LOCAL: &str = "%Y-%m-%d %H:%M:%SL";
const FRIENDLY_FORMAT_UTC: &str = "%Y-%m-%d %H:%M:%SZ";

/// Environment variable that controls what gets logged
const STANDARD_ENV_VAR: &str = "RUST_LOG";

/// Selects the format of time stamps in output messages
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum TimeFormat {
    /// Local time (as best as we can figure it out), as "year-month-day HH:MM:SS"
    #[default]
    Local,
    /// UTC time, as "year-month-day HH:MM:SS"
    Utc,
    /// UTC time, in the format described in [RFC 3339](https://datatracker.ietf.org/doc/html/rfc3339).
    Rfc3339,
}
crate::util::deserialize_enum_from_str!(TimeFormat);

/// Where log output goes
#[derive(Debug, Default)]
pub enum TraceOutput {
    /// Standard error
    #[default]
    Stderr,
    /// A log file, which is created (or truncated)
    File(std::path::PathBuf),
}

/// Log filter setup:
/// Use the environment variable if present, otherwise log only simcam items at the given level.
fn filter_for(trace_level: &str) -> anyhow::Result<(EnvFilter, bool)> {
    EnvFilter::try_from_env(STANDARD_ENV_VAR)
        .map(|filter| (filter, true))
        .or_else(|e| {
            if std::env::var(STANDARD_ENV_VAR).is_ok() {
                anyhow::bail!("{STANDARD_ENV_VAR} (set in environment) was not understood: {e}");
            }
            Ok((EnvFilter::try_new(format!("simcam={trace_level}"))?, false))
        })
}

fn make_tracing_layer<S, W>(
    writer: W,
    filter: EnvFilter,
    time_format: TimeFormat,
    show_target: bool,
    ansi: bool,
) -> Box<dyn tracing_subscriber::Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static + Sync + Send,
{
    let layer = tracing_subscriber::fmt::layer::<S>()
        .compact()
        .with_target(show_target)
        .with_ansi(ansi);

    // The timer has to go on before the writer and filter, hence the repetition
    match time_format {
        TimeFormat::Local => layer
            .with_timer(ChronoLocal::new(FRIENDLY_FORMAT_LOCAL.into()))
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        TimeFormat::Utc => layer
            .with_timer(ChronoUtc::new(FRIENDLY_FORMAT_UTC.into()))
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        TimeFormat::Rfc3339 => layer
            .with_timer(ChronoLocal::rfc_3339())
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}

fn make_layer(
    trace_level: &str,
    output: TraceOutput,
    time_format: TimeFormat,
) -> anyhow::Result<Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync>>
{
    let (filter, used_env) = filter_for(trace_level)?;
    // If we used the environment variable, show log targets; otherwise we only log simcam, so the targets are noise.
    Ok(match output {
        TraceOutput::Stderr => {
            make_tracing_layer(std::io::stderr, filter, time_format, used_env, true)
        }
        TraceOutput::File(path) => {
            let out_file = Arc::new(
                File::create(&path)
                    .with_context(|| format!("failed to open log file {}", path.display()))?,
            );
            make_tracing_layer(out_file, filter, time_format, used_env, false)
        }
    })
}

/// Sets up rust tracing for an application embedding the simulator.
///
/// By default we log only our own events, at the given trace level
/// (`"error"`, `"warn"`, `"info"`, `"debug"` or `"trace"`).
/// This can be overridden by setting `RUST_LOG`.
///
/// **NOTE:** This can only take effect once per process. Subsequent calls log a warning and do nothing.
pub fn setup(
    trace_level: &str,
    output: TraceOutput,
    time_format: TimeFormat,
) -> anyhow::Result<()> {
    if TRACING_INITIALIZED.swap(true, Ordering::Relaxed) {
        tracing::warn!("tracing setup called a second time (ignoring)");
        return Ok(());
    }
    let layer = make_layer(trace_level, output, time_format).inspect_err(|_| {
        TRACING_INITIALIZED.store(false, Ordering::Relaxed);
    })?;
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .context("a global tracing subscriber was already installed")
}

/// Returns whether tracing has been initialized
#[must_use]
pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.load(Ordering::Relaxed)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{TimeFormat, TraceOutput, make_layer};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde::Deserialize;

    #[rstest]
    #[case("local", TimeFormat::Local)]
    #[case("UTC", TimeFormat::Utc)]
    #[case("Rfc3339", TimeFormat::Rfc3339)]
    fn time_format_deserializes_any_case(#[case] input: &str, #[case] expected: TimeFormat) {
        #[derive(Deserialize)]
        struct Test {
            t: TimeFormat,
        }
        let parsed: Test = figment::Figment::new()
            .merge(figment::providers::Serialized::default("t", input))
            .extract()
            .unwrap();
        assert_eq!(parsed.t, expected);
    }

    #[test]
    fn unknown_time_format_is_rejected() {
        let r: Result<TimeFormat, _> = figment::Figment::new()
            .merge(figment::providers::Serialized::default("t", "martian"))
            .extract_inner("t");
        let msg = r.unwrap_err().to_string();
        assert!(msg.contains("martian"), "{msg}");
    }

    #[test]
    fn file_layer_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simcam.log");
        let _layer = make_layer("debug", TraceOutput::File(path.clone()), TimeFormat::Utc).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("simcam.log");
        let err = make_layer("info", TraceOutput::File(path), TimeFormat::Local)
            .err()
            .unwrap();
        assert!(err.to_string().contains("failed to open log file"));
    }
}
