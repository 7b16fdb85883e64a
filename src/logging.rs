//! tracing ベースのログ初期化

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "seoforge.log";

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error)
    pub level: String,

    /// 出力フォーマット
    pub format: LogFormat,

    /// コンソール出力有効
    pub console_enabled: bool,

    /// ファイル出力有効
    pub file_enabled: bool,

    /// ログディレクトリ
    pub log_dir: PathBuf,

    /// ファイルローテーション設定
    pub rotation: LogRotation,
}

/// ログ出力フォーマット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 人間が読むテキスト形式
    Text,
    /// 構造化JSON形式
    Json,
}

/// ファイルローテーション設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// 日次ローテーション
    Daily,
    /// 時間毎ローテーション
    Hourly,
    /// ローテーションなし
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            console_enabled: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            rotation: LogRotation::Daily,
        }
    }
}

impl LogConfig {
    /// ログレベル設定
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// フォーマット設定
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// コンソール出力制御
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    /// ファイル出力制御
    pub fn with_file(mut self, enabled: bool) -> Self {
        self.file_enabled = enabled;
        self
    }

    /// カスタムログディレクトリを設定
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// ローテーション設定
    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// ログシステムを初期化
///
/// ファイル出力が有効な場合は non-blocking ライターのガードを返す。
/// ガードを落とすとバッファ済みログが失われるため、呼び出し側で
/// プロセス終了まで保持すること。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    if !config.console_enabled && !config.file_enabled {
        // 最低限のコンソール出力
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        return Ok(None);
    }

    if !config.file_enabled {
        match config.format {
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(true)
                .try_init()
                .map_err(|e| anyhow::anyhow!("{e}"))?,
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter())
                .with_target(true)
                .try_init()
                .map_err(|e| anyhow::anyhow!("{e}"))?,
        }
        return Ok(None);
    }

    ensure_log_dir(&config.log_dir)?;
    let appender = match config.rotation {
        LogRotation::Daily => rolling::daily(&config.log_dir, LOG_FILE),
        LogRotation::Hourly => rolling::hourly(&config.log_dir, LOG_FILE),
        LogRotation::Never => rolling::never(&config.log_dir, LOG_FILE),
    };
    let (writer, guard) = non_blocking(appender);

    match (config.format, config.console_enabled) {
        (LogFormat::Text, true) => tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr.and(writer))
            .with_target(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?,
        (LogFormat::Text, false) => tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?,
        (LogFormat::Json, true) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr.and(writer))
            .with_target(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?,
        (LogFormat::Json, false) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?,
    }

    tracing::info!(
        level = %config.level,
        dir = %config.log_dir.display(),
        "logging initialized with file output"
    );

    Ok(Some(guard))
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
