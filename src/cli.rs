use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "colony-counter")]
#[command(about = "細菌コロニー計数クライアント（画像送信・解析履歴）", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像を送信してコロニーを計数
    Analyze {
        /// シャーレ画像ファイル
        #[arg(required = true)]
        file: PathBuf,

        /// 検体名（省略時はファイル名）
        #[arg(short, long)]
        sample: Option<String>,

        /// プレート中心のX座標（省略時は自動検出）
        #[arg(long)]
        plate_x: Option<u32>,

        /// プレート中心のY座標
        #[arg(long)]
        plate_y: Option<u32>,

        /// プレート半径（px）
        #[arg(long)]
        plate_r: Option<u32>,

        /// 結果画像の保存先（デフォルト: resultado_<ファイル名>）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 解析履歴
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// 設定を表示/編集
    Config {
        /// 解析サーバーのURLを設定
        #[arg(long)]
        set_url: Option<String>,

        /// 応答待ちタイムアウト（秒、30以上）
        #[arg(long)]
        set_timeout: Option<u64>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// 履歴を一覧表示
    List,

    /// 選択した履歴をエクスポート
    Export {
        /// 出力ファイル
        #[arg(short, long, required = true)]
        output: PathBuf,

        /// 対象の番号（1始まり、カンマ区切り）
        #[arg(long, value_delimiter = ',', conflicts_with = "all")]
        select: Vec<usize>,

        /// すべてを対象にする
        #[arg(long)]
        all: bool,

        /// 出力形式 (csv/excel)
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,
    },

    /// 履歴を1件削除
    Remove {
        /// 番号（1始まり）
        index: usize,
    },

    /// 履歴をすべて削除
    Clear {
        /// 確認なしで削除
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Excel,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            _ => Err(format!("Unknown format: {}. Use csv or excel", s)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Excel => write!(f, "excel"),
        }
    }
}
