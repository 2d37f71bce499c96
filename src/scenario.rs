use crate::models::{
    Aabb, CharacterControllerConfig, Collider, ControlMode, DEFAULT_GRAVITY, DEFAULT_MAX_DT_S, InputCommand,
    MovementParams, ScheduledInput,
};
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

impl Default for ScenarioMeta {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: "unnamed".to_string(),
            description: String::new(),
        }
    }
}

/// フレーム落ち（時間刻みの一時的な増大）
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct FrameHitch {
    /// 発生時刻（秒）
    pub t_s: f64,
    /// そのフレームの実時間刻み（秒）。`max_dt_s`でクランプされる
    pub dt_s: f64,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 通常フレームの時間刻み（秒）
    pub dt_s: f64,
    /// 時間刻みの上限（秒）
    pub max_dt_s: f64,
    /// シミュレーション時間（秒）
    pub t_max_s: f64,
    pub hitches: Vec<FrameHitch>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt_s: 1.0 / 60.0,
            max_dt_s: DEFAULT_MAX_DT_S,
            t_max_s: 10.0,
            hitches: Vec::new(),
        }
    }
}

/// 世界設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: DVec3,
    pub ground_height: f64,
    pub obstacles: Vec<Aabb>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            ground_height: 0.0,
            obstacles: Vec::new(),
        }
    }
}

/// エージェント設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub id: String,
    pub mode: ControlMode,
    /// 初期位置（コライダー中心）
    pub start: DVec3,
    pub half_extents: DVec3,
    pub mass: f64,
    pub linear_damping: f64,
    /// 開始時に選択済みにするか
    pub selected: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let collider = Collider::default();
        Self {
            id: "dwarf".to_string(),
            mode: ControlMode::default(),
            start: DVec3::new(0.0, collider.half_extents.y, 0.0),
            half_extents: collider.half_extents,
            mass: 1.0,
            linear_damping: 0.5,
            selected: false,
        }
    }
}

/// カメラ設定（クリック入力のピッキング用）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraConfig {
    pub eye: DVec3,
    pub look_at: DVec3,
    pub fov_y_deg: f64,
    pub aspect: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: DVec3::new(0.0, 20.0, 20.0),
            look_at: DVec3::ZERO,
            fov_y_deg: 75.0,
            aspect: 16.0 / 9.0,
        }
    }
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    pub world: WorldConfig,
    pub agent: AgentConfig,
    pub movement: MovementParams,
    pub character_controller: CharacterControllerConfig,
    pub camera: CameraConfig,
    pub inputs: Vec<ScheduledInput>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: ScenarioConfig = serde_yaml::from_str(&contents).map_err(|source| ScenarioError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;

        Ok(config)
    }

    /// YAML文字列からシナリオ設定を読み込み
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig = serde_yaml::from_str(contents).map_err(|source| ScenarioError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 組み込みのデモシナリオ
    ///
    /// 選択 → 目標指示 → 途中で目標変更 → 到達後にクリック指示 → 選択解除、の一連の入力を
    /// 含み、低い段差と壁のある地形を移動します。
    pub fn demo(mode: ControlMode) -> Self {
        Self {
            meta: ScenarioMeta {
                version: "1.0".to_string(),
                name: "demo".to_string(),
                description: "組み込みデモ: 段差と壁を回り込んで目標へ移動".to_string(),
            },
            sim: SimulationConfig {
                t_max_s: 12.0,
                hitches: vec![FrameHitch { t_s: 2.0, dt_s: 0.5 }],
                ..SimulationConfig::default()
            },
            world: WorldConfig {
                obstacles: vec![
                    Aabb::new(DVec3::new(2.0, 0.0, -3.0), DVec3::new(3.0, 0.25, 3.0)),
                    Aabb::new(DVec3::new(-4.0, 0.0, 2.0), DVec3::new(-3.0, 2.0, 6.0)),
                ],
                ..WorldConfig::default()
            },
            agent: AgentConfig {
                mode,
                ..AgentConfig::default()
            },
            inputs: vec![
                ScheduledInput {
                    t_s: 0.0,
                    command: InputCommand::Select,
                },
                ScheduledInput {
                    t_s: 0.1,
                    command: InputCommand::Goal {
                        point: DVec3::new(5.0, 0.0, 1.0),
                    },
                },
                ScheduledInput {
                    t_s: 4.0,
                    command: InputCommand::Goal {
                        point: DVec3::new(-2.0, 0.0, 4.0),
                    },
                },
                ScheduledInput {
                    t_s: 9.0,
                    command: InputCommand::Click { ndc: DVec2::ZERO },
                },
                ScheduledInput {
                    t_s: 11.5,
                    command: InputCommand::Deselect,
                },
            ],
            ..Self::default()
        }
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.sim.dt_s <= 0.0 {
            return Err(ScenarioError::Validation("dt_s must be positive".to_string()));
        }
        if self.sim.max_dt_s <= 0.0 {
            return Err(ScenarioError::Validation("max_dt_s must be positive".to_string()));
        }
        if self.sim.t_max_s <= 0.0 {
            return Err(ScenarioError::Validation("t_max_s must be positive".to_string()));
        }
        for hitch in &self.sim.hitches {
            if hitch.dt_s <= 0.0 {
                return Err(ScenarioError::Validation(format!(
                    "hitch at {}s must have a positive dt_s",
                    hitch.t_s
                )));
            }
        }

        let agent = &self.agent;
        if agent.mass <= 0.0 {
            return Err(ScenarioError::Validation("agent mass must be positive".to_string()));
        }
        if agent.linear_damping < 0.0 {
            return Err(ScenarioError::Validation("linear_damping must not be negative".to_string()));
        }
        if agent.half_extents.min_element() <= 0.0 {
            return Err(ScenarioError::Validation("agent half_extents must be positive".to_string()));
        }

        let movement = &self.movement;
        if movement.stop_distance_threshold <= 0.0 || movement.stop_speed_threshold <= 0.0 {
            return Err(ScenarioError::Validation("stop thresholds must be positive".to_string()));
        }
        if movement.overshoot_distance_threshold < movement.stop_distance_threshold {
            return Err(ScenarioError::Validation(
                "overshoot_distance_threshold must not be smaller than stop_distance_threshold".to_string(),
            ));
        }
        if movement.force_factor <= 0.0 || movement.max_force <= 0.0 {
            return Err(ScenarioError::Validation("force_factor and max_force must be positive".to_string()));
        }
        if movement.min_propulsion_distance > movement.stop_distance_threshold {
            // 推進が止まる距離と停止距離の間で、制動だけが働いて停滞する
            return Err(ScenarioError::Validation(
                "min_propulsion_distance must not exceed stop_distance_threshold".to_string(),
            ));
        }
        if movement.brake_epsilon <= 0.0 {
            return Err(ScenarioError::Validation("brake_epsilon must be positive".to_string()));
        }

        let controller = &self.character_controller;
        if controller.offset < 0.0 || controller.autostep_max_height < 0.0 || controller.snap_to_ground < 0.0 {
            return Err(ScenarioError::Validation(
                "character controller distances must not be negative".to_string(),
            ));
        }

        for (i, obstacle) in self.world.obstacles.iter().enumerate() {
            if !obstacle.is_valid() {
                return Err(ScenarioError::Validation(format!("obstacle #{} has min >= max", i)));
            }
        }

        if !(self.camera.fov_y_deg > 0.0 && self.camera.fov_y_deg < 180.0) || self.camera.aspect <= 0.0 {
            return Err(ScenarioError::Validation("invalid camera projection".to_string()));
        }

        for input in &self.inputs {
            if input.t_s < 0.0 || input.t_s >= self.sim.t_max_s {
                return Err(ScenarioError::Validation(format!(
                    "input {:?} at {}s is outside simulation time {}",
                    input.command, input.t_s, self.sim.t_max_s
                )));
            }
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("時間刻み: {:.4}秒 (上限: {:.3}秒)", self.sim.dt_s, self.sim.max_dt_s);
        println!("最大時間: {:.1}秒", self.sim.t_max_s);
        println!("フレーム落ち: {}件", self.sim.hitches.len());
        println!();

        println!("=== エージェント ===");
        println!("ID: {}", self.agent.id);
        println!("制御モード: {:?}", self.agent.mode);
        println!(
            "初期位置: ({:.2}, {:.2}, {:.2})",
            self.agent.start.x, self.agent.start.y, self.agent.start.z
        );
        println!(
            "停止距離: {:.2} / 推進係数: {:.1} / 最大推進力: {:.1}",
            self.movement.stop_distance_threshold, self.movement.force_factor, self.movement.max_force
        );
        println!();

        println!("=== 地形 ===");
        println!("障害物: {}個", self.world.obstacles.len());
        println!("入力イベント: {}件", self.inputs.len());
        for input in &self.inputs {
            println!("  {:>6.2}秒: {:?}", input.t_s, input.command);
        }
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("YAML解析エラー {}: {source}", .path.display())]
    Parse { path: PathBuf, source: serde_yaml::Error },
    #[error("設定検証エラー: {0}")]
    Validation(String),
}
