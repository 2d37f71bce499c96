use anyhow::{Context, Result, bail};
use clap::{Arg, ArgMatches, Command};
use dwarfsim::logging::{LogConfig, LogOutput, init_logging, level_for_verbosity, parse_log_level};
use dwarfsim::models::ControlMode;
use dwarfsim::scenario::ScenarioConfig;
use dwarfsim::simulation::SimulationEngine;
use std::str::FromStr;

fn main() -> Result<()> {
    let matches = Command::new("dwarfsim")
        .version("0.1.0")
        .about("キャラクター移動制御シミュレーション (Dwarf Movement Simulation)")
        .long_about(
            "クリックで選択したキャラクターを目標地点まで移動させる移動制御のシミュレーション\n\
             力制御とキネマティック制御（衝突解決付き）の挙動をフレーム駆動で確認します。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定"),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
                .conflicts_with("test"),
        )
        .arg(
            Arg::new("test")
                .short('t')
                .long("test")
                .action(clap::ArgAction::SetTrue)
                .help("組み込みデモシナリオを実行")
                .conflicts_with("info"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .value_parser(["force", "kinematic"])
                .help("制御モードを上書き (force | kinematic)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: デバッグ)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベル (trace, debug, info, warn, error)。-v より優先"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("OUTPUT")
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .default_value("logs")
                .help("ログファイルの出力ディレクトリ"),
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");
    let _log_guard = init_logging(log_config(&matches, verbose_level)?)
        .map_err(|e| anyhow::anyhow!("ログ初期化に失敗しました: {}", e))?;

    println!("キャラクター移動制御シミュレーション - dwarfsim v0.1.0");
    println!();

    let mode = matches
        .get_one::<String>("mode")
        .map(|m| parse_mode(m))
        .transpose()?;

    if matches.get_flag("test") {
        println!("=== 組み込みデモシナリオ ===");
        let scenario = ScenarioConfig::demo(mode.unwrap_or_default());
        return execute_scenario(scenario, verbose_level);
    }

    match matches.get_one::<String>("scenario") {
        Some(scenario_path) => {
            run_scenario(scenario_path, mode, matches.get_flag("info"), verbose_level)?;
            if verbose_level > 0 {
                println!("シナリオ実行が正常に完了しました。");
            }
        }
        None => show_default_help(),
    }

    Ok(())
}

fn log_config(matches: &ArgMatches, verbose_level: u8) -> Result<LogConfig> {
    let level = match matches.get_one::<String>("log-level") {
        Some(level) => parse_log_level(level),
        None => level_for_verbosity(verbose_level),
    };
    let output = match matches.get_one::<String>("log-output") {
        Some(output) => LogOutput::from_str(output).map_err(anyhow::Error::msg)?,
        None => LogOutput::Console,
    };
    let mut config = LogConfig {
        level,
        output,
        ..LogConfig::default()
    };
    if let Some(dir) = matches.get_one::<String>("log-dir") {
        config.log_dir = dir.clone();
    }
    Ok(config)
}

fn parse_mode(mode: &str) -> Result<ControlMode> {
    match mode {
        "force" => Ok(ControlMode::Force),
        "kinematic" => Ok(ControlMode::Kinematic),
        other => bail!("無効な制御モード: {}", other),
    }
}

/// シナリオファイルを読み込んで実行
fn run_scenario(scenario_path: &str, mode: Option<ControlMode>, info_only: bool, verbose_level: u8) -> Result<()> {
    let mut scenario = ScenarioConfig::from_file(scenario_path)
        .with_context(|| format!("シナリオを読み込めませんでした: {}", scenario_path))?;

    if let Some(mode) = mode {
        scenario.agent.mode = mode;
    }

    if verbose_level > 0 {
        println!("シナリオファイル読み込み完了: {}", scenario_path);
    }

    if info_only {
        scenario.print_summary();
        return Ok(());
    }

    execute_scenario(scenario, verbose_level)
}

fn execute_scenario(scenario: ScenarioConfig, verbose_level: u8) -> Result<()> {
    scenario.print_summary();
    println!();

    let mut simulation = SimulationEngine::new(scenario, verbose_level);
    simulation.initialize()?;
    simulation.run()?;
    simulation.print_report();

    Ok(())
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  dwarfsim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>  シナリオファイルを指定して実行");
    println!("  -i, --info             シナリオ情報のみ表示");
    println!("  -t, --test             組み込みデモシナリオを実行");
    println!("  -m, --mode <MODE>      制御モードを上書き (force | kinematic)");
    println!("  -v, --verbose          詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-output <OUT> ログ出力先 (console, file, both)");
    println!("  -h, --help             このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/walk_to_goal.yaml        - 平地での力制御による移動");
    println!("  scenarios/obstacle_course.yaml     - 段差と壁のあるキネマティック移動");
    println!("  scenarios/click_and_deselect.yaml  - クリック選択・目標指示・選択解除");
    println!();
    println!("例:");
    println!("  dwarfsim -s scenarios/walk_to_goal.yaml");
    println!("  dwarfsim -s scenarios/obstacle_course.yaml -v");
    println!("  dwarfsim -s scenarios/walk_to_goal.yaml -m kinematic -i");
    println!("  dwarfsim --test -m force");
}
