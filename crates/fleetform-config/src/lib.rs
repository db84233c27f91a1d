pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 並列度を上書きする環境変数
pub const PARALLELISM_ENV: &str = "FLEETFORM_PARALLELISM";

/// マニフェストのパスを直接指定する環境変数
pub const MANIFEST_ENV: &str = "FLEETFORM_MANIFEST";

const SETTINGS_FILE: &str = "config.yaml";
const PROJECT_DIR: &str = ".fleetform";
const MANIFEST_CANDIDATES: [&str; 3] = ["fleetform.local.kdl", "fleetform.kdl", ".fleetform.kdl"];

/// FleetFormの設定ディレクトリを取得（~/.config/fleetform）
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("fleetform");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// リトライ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// エンジン設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 同時に実行するプロバイダー呼び出しの上限
    pub parallelism: usize,

    pub retry: RetrySettings,

    /// 状態ファイルのディレクトリ（相対パスはプロジェクトルート基準）
    pub state_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallelism: 10,
            retry: RetrySettings::default(),
            state_dir: PathBuf::from(PROJECT_DIR),
        }
    }
}

/// 設定ファイルの内容（指定されたフィールドだけ上書きする）
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    parallelism: Option<usize>,
    retry: Option<RetryFile>,
    state_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryFile {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
}

impl Settings {
    /// 設定を読み込む
    ///
    /// 優先順位（後のものが優先）:
    /// 1. デフォルト値
    /// 2. ~/.config/fleetform/config.yaml
    /// 3. <project_root>/.fleetform/config.yaml
    /// 4. 環境変数 FLEETFORM_PARALLELISM
    pub fn load(project_root: &Path) -> Result<Self> {
        let global = dirs::config_dir().map(|d| d.join("fleetform").join(SETTINGS_FILE));
        Self::load_from(global.as_deref(), project_root)
    }

    /// グローバル設定ファイルのパスを明示して読み込む
    pub fn load_from(global: Option<&Path>, project_root: &Path) -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(path) = global {
            settings.merge_file(path)?;
        }
        settings.merge_file(&project_root.join(PROJECT_DIR).join(SETTINGS_FILE))?;
        settings.apply_env()?;
        settings.validate()?;

        Ok(settings)
    }

    /// ファイルが存在すれば、指定されたフィールドだけ上書きする
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)?;
        let file: SettingsFile = if content.trim().is_empty() {
            SettingsFile::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };
        tracing::debug!("設定ファイルを読み込みました: {}", path.display());

        if let Some(parallelism) = file.parallelism {
            self.parallelism = parallelism;
        }
        if let Some(state_dir) = file.state_dir {
            self.state_dir = state_dir;
        }
        if let Some(retry) = file.retry {
            if let Some(v) = retry.max_attempts {
                self.retry.max_attempts = v;
            }
            if let Some(v) = retry.initial_delay_ms {
                self.retry.initial_delay_ms = v;
            }
            if let Some(v) = retry.max_delay_ms {
                self.retry.max_delay_ms = v;
            }
            if let Some(v) = retry.backoff_multiplier {
                self.retry.backoff_multiplier = v;
            }
        }
        Ok(())
    }

    /// 環境変数による上書き
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(PARALLELISM_ENV) {
            self.parallelism = value.trim().parse().map_err(|_| {
                ConfigError::InvalidSettings(format!(
                    "{} は正の整数で指定してください: {}",
                    PARALLELISM_ENV, value
                ))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidSettings(
                "parallelism は 1 以上を指定してください".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidSettings(
                "retry.max_attempts は 1 以上を指定してください".to_string(),
            ));
        }
        if !(self.retry.backoff_multiplier >= 1.0) {
            return Err(ConfigError::InvalidSettings(
                "retry.backoff_multiplier は 1.0 以上を指定してください".to_string(),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidSettings(
                "retry.initial_delay_ms が retry.max_delay_ms を超えています".to_string(),
            ));
        }
        Ok(())
    }

    /// 状態ディレクトリの絶対パス
    pub fn state_dir(&self, project_root: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            project_root.join(&self.state_dir)
        }
    }
}

/// プロジェクトのマニフェストファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 FLEETFORM_MANIFEST (直接パス指定)
/// 2. カレントディレクトリ: fleetform.local.kdl, fleetform.kdl, .fleetform.kdl
/// 3. ./.fleetform/ ディレクトリ内: 同様の順序
pub fn find_manifest_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(manifest_path) = std::env::var(MANIFEST_ENV) {
        let path = PathBuf::from(manifest_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} のパスが存在しません: {}", MANIFEST_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;
    find_manifest_in(&current_dir)
}

/// 指定ディレクトリを起点にマニフェストを探す
pub fn find_manifest_in(dir: &Path) -> Result<PathBuf> {
    // 2. ディレクトリ直下
    for filename in &MANIFEST_CANDIDATES {
        let path = dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.fleetform/ ディレクトリ
    let project_dir = dir.join(PROJECT_DIR);
    if project_dir.is_dir() {
        for filename in &MANIFEST_CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err(ConfigError::ManifestNotFound)
}
