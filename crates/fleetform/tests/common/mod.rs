use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// VPC → サブネット → インスタンスの3リソース構成
#[allow(dead_code)]
pub const BASIC_MANIFEST: &str = r#"
resource "aws_vpc" "main" {
    cidr_block "10.0.0.0/16"
}

resource "aws_subnet" "public" {
    vpc_id (ref)"aws_vpc.main.id"
    cidr_block "10.0.1.0/24"
}

resource "aws_instance" "web" {
    subnet_id (ref)"aws_subnet.public.id"
    ami "ami-0123456789"
}

output "web_ip" (ref)"aws_instance.web.private_ip"
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_manifest(&self, content: &str) {
        let path = self.root.path().join("fleetform.kdl");
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// プロジェクトディレクトリで実行し、ユーザー設定や環境変数の影響を受けないコマンド
    #[allow(deprecated)]
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("fleetform").unwrap();
        cmd.current_dir(self.path())
            .env("XDG_CONFIG_HOME", self.path().join("xdg"))
            .env("NO_COLOR", "1")
            .env_remove("FLEETFORM_MANIFEST")
            .env_remove("FLEETFORM_PARALLELISM")
            .env_remove("RUST_LOG");
        cmd
    }
}
