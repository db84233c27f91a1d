use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "マニフェストが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: fleetform.local.kdl, fleetform.kdl, .fleetform.kdl\n\
        - ./.fleetform/ ディレクトリ\n\
        または FLEETFORM_MANIFEST 環境変数で直接指定できます"
    )]
    ManifestNotFound,

    #[error("設定値が不正です: {0}")]
    InvalidSettings(String),

    #[error("設定ファイルの読み込みに失敗しました: {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
