//! # Simulation モジュール
//!
//! 移動制御のフレーム駆動シミュレーションエンジンを提供します。
//!
//! 実時間のフレームループを模し、フレームごとの時間刻みを上限でクランプしながら
//! エージェント1体の入力処理・移動制御・物理ステップを進めます。
//!
//! ## フレーム内の処理順序
//!
//! 1. **時間刻みのクランプ**: フレーム落ち時の積分誤差を抑える
//! 2. **入力処理**: 時刻に達した入力（選択・目標指示・クリック・選択解除）を適用
//! 3. **移動制御（ステップ前）**: 力を加える、またはキネマティックの次位置を設定
//! 4. **物理ステップ**: 剛体の積分・次位置への移動
//! 5. **移動制御（ステップ後）**: 物理ステップの結果を読み戻して停止判定
//!
//! 入力は必ず移動制御より先に適用され、キネマティックの次位置は物理ステップの前に
//! 設定されます。
//!
//! ## 使用例
//!
//! ```no_run
//! use dwarfsim::scenario::ScenarioConfig;
//! use dwarfsim::simulation::SimulationEngine;
//!
//! let config = ScenarioConfig::from_file("scenarios/walk_to_goal.yaml")?;
//! let mut engine = SimulationEngine::new(config, 1);
//! engine.initialize()?;
//! let stats = engine.run()?;
//! println!("到達回数: {}", stats.arrivals);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::models::*;
use crate::scenario::{FrameHitch, ScenarioConfig};
use glam::{DVec2, DVec3};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// 暴走防止のステップ数上限
const MAX_STEPS: u64 = 1_000_000;

/// 入力の発火時刻判定の許容誤差
const TIME_EPSILON: f64 = 1e-9;

/// シミュレーション統計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub steps: u64,
    /// 時間刻みがクランプされたフレーム数
    pub clamped_frames: u64,
    pub goals_issued: u32,
    pub goals_accepted: u32,
    pub goals_rejected: u32,
    pub arrivals: u32,
    pub overshoot_stops: u32,
    /// 目標を持ったまま選択解除された回数
    pub deselect_clears: u32,
    /// 水平移動距離の累計
    pub distance_travelled: f64,
}

/// シミュレーション実行エラー
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("シミュレーションエンジンが初期化されていません")]
    NotInitialized,
}

pub struct SimulationEngine {
    pub current_time: f64,
    pub dt: f64,
    pub max_dt: f64,
    pub max_time: f64,
    pub step_count: u64,

    pub agent: Agent<SimBody>,
    pub world: PhysicsWorld,
    pub resolver: SlideResolver,
    pub controller: MovementController,
    pub ground: GroundPlane,

    pending_inputs: VecDeque<ScheduledInput>,
    pending_hitches: VecDeque<FrameHitch>,
    initialized: bool,

    pub stats: SimulationStats,
    pub scenario_config: ScenarioConfig,
    pub verbose_level: u8,
}

impl SimulationEngine {
    pub fn new(scenario: ScenarioConfig, verbose_level: u8) -> Self {
        let world = PhysicsWorld::new(
            scenario.world.gravity,
            scenario.world.ground_height,
            scenario.world.obstacles.clone(),
        );
        let resolver = world.create_character_controller(scenario.character_controller);
        let controller = MovementController::new(scenario.agent.mode, scenario.movement);
        let agent = Agent::new(scenario.agent.id.clone(), Collider::cuboid(scenario.agent.half_extents));

        Self {
            current_time: 0.0,
            dt: scenario.sim.dt_s,
            max_dt: scenario.sim.max_dt_s,
            max_time: scenario.sim.t_max_s,
            step_count: 0,
            agent,
            ground: GroundPlane::new(world.ground_height),
            world,
            resolver,
            controller,
            pending_inputs: VecDeque::new(),
            pending_hitches: VecDeque::new(),
            initialized: false,
            stats: SimulationStats::default(),
            scenario_config: scenario,
            verbose_level,
        }
    }

    /// エージェントに物理ハンドルを接続し、入力とフレーム落ちの予定を時刻順に並べる
    pub fn initialize(&mut self) -> Result<(), SimulationError> {
        if self.verbose_level > 0 {
            info!("シミュレーションエンジンを初期化中...");
        }

        let agent_config = &self.scenario_config.agent;
        let body = SimBody::new(
            BodyKind::from(agent_config.mode),
            agent_config.start,
            *self.agent.collider(),
        )
        .with_mass(agent_config.mass)
        .with_linear_damping(agent_config.linear_damping);
        self.agent.attach_body(body);

        if agent_config.selected {
            self.agent.select();
        }

        let mut inputs = self.scenario_config.inputs.clone();
        inputs.sort_by(|a, b| a.t_s.total_cmp(&b.t_s));
        self.pending_inputs = inputs.into();

        let mut hitches = self.scenario_config.sim.hitches.clone();
        hitches.sort_by(|a, b| a.t_s.total_cmp(&b.t_s));
        self.pending_hitches = hitches.into();

        self.initialized = true;

        if self.verbose_level > 0 {
            info!("初期化完了:");
            info!(
                "  エージェント: {} ({:?}, 操作可能: {})",
                self.agent.get_id(),
                self.controller.mode,
                self.agent.is_active()
            );
            info!("  障害物: {}個", self.world.obstacles.len());
            info!("  入力イベント: {}件", self.pending_inputs.len());
        }

        Ok(())
    }

    pub fn run(&mut self) -> Result<SimulationStats, SimulationError> {
        if !self.initialized {
            return Err(SimulationError::NotInitialized);
        }

        info!("=== シミュレーション実行開始 ===");

        while self.current_time < self.max_time {
            let raw_dt = self.next_frame_dt();
            self.step(raw_dt);

            if self.verbose_level > 2 {
                trace!("時刻: {:.3}秒 (ステップ: {})", self.current_time, self.step_count);
            }

            if self.step_count % 100 == 0 && self.verbose_level > 0 {
                let progress = (self.current_time / self.max_time) * 100.0;
                info!("進行状況: {:.1}% ({:.1}/{:.1}秒)", progress, self.current_time, self.max_time);
            }

            if self.step_count >= MAX_STEPS {
                warn!(max_steps = MAX_STEPS, "SIMULATION_STEP_LIMIT: ステップ数の上限に達したため終了します");
                break;
            }
        }

        let position = self.agent.position().unwrap_or_default();
        info!(
            elapsed = self.current_time,
            steps = self.step_count,
            arrivals = self.stats.arrivals,
            overshoot_stops = self.stats.overshoot_stops,
            distance_travelled = self.stats.distance_travelled,
            final_x = position.x,
            final_z = position.z,
            "=== シミュレーション完了 ==="
        );

        Ok(self.stats.clone())
    }

    /// 1フレーム進め、実際に使用した時間刻みを返す
    pub fn step(&mut self, raw_dt: f64) -> f64 {
        let dt = self.clamp_dt(raw_dt);

        self.apply_due_inputs();

        let before = self.agent.position();
        let output = self
            .controller
            .before_step(&mut self.agent, dt, self.world.gravity, &self.resolver);

        if let Some(body) = self.agent.body_mut() {
            self.world.step(body, dt);
        }

        let stopped = output.stopped.or(self.controller.after_step(&mut self.agent));
        match stopped {
            Some(StopReason::Arrived) => self.stats.arrivals += 1,
            Some(StopReason::Overshoot) => self.stats.overshoot_stops += 1,
            _ => {}
        }

        if let (Some(before), Some(after)) = (before, self.agent.position()) {
            self.stats.distance_travelled += (after - before).planar_length();
        }

        self.current_time += dt;
        self.step_count += 1;
        self.stats.steps = self.step_count;
        dt
    }

    /// 時間刻みを上限でクランプ
    pub fn clamp_dt(&mut self, raw_dt: f64) -> f64 {
        if raw_dt > self.max_dt {
            self.stats.clamped_frames += 1;
            debug!(
                raw_dt,
                max_dt = self.max_dt,
                time = self.current_time,
                "FRAME_DT_CLAMPED: フレーム時間刻みをクランプしました"
            );
            self.max_dt
        } else {
            raw_dt.max(0.0)
        }
    }

    /// 次フレームの実時間刻み（フレーム落ちの予定があればその値）
    fn next_frame_dt(&mut self) -> f64 {
        match self.pending_hitches.front() {
            Some(hitch) if hitch.t_s <= self.current_time + TIME_EPSILON => {
                let dt = hitch.dt_s;
                self.pending_hitches.pop_front();
                dt
            }
            _ => self.dt,
        }
    }

    fn apply_due_inputs(&mut self) {
        while let Some(input) = self.pending_inputs.front().copied() {
            if input.t_s > self.current_time + TIME_EPSILON {
                break;
            }
            self.pending_inputs.pop_front();
            self.apply_input(input.command);
        }
    }

    /// 入力を1件適用
    pub fn apply_input(&mut self, command: InputCommand) {
        debug!(time = self.current_time, command = ?command, "INPUT_RECEIVED: 入力を受け付けました");

        match command {
            InputCommand::Select => self.agent.select(),
            InputCommand::Deselect => {
                if self.agent.deselect().is_some() {
                    self.stats.deselect_clears += 1;
                }
            }
            InputCommand::Goal { point } => self.issue_goal(point),
            InputCommand::Click { ndc } => self.handle_click(ndc),
            InputCommand::ClearGoal => {
                self.agent.clear_goal();
            }
        }
    }

    fn issue_goal(&mut self, point: DVec3) {
        self.stats.goals_issued += 1;
        if self.agent.set_goal(point) {
            self.stats.goals_accepted += 1;
        } else {
            self.stats.goals_rejected += 1;
        }
    }

    /// 画面クリック: 選択中なら地面上の点を目標にし、未選択ならエージェントに当たれば選択する
    fn handle_click(&mut self, ndc: DVec2) {
        let camera = &self.scenario_config.camera;
        let Some(ray) = Ray::from_camera(camera.eye, camera.look_at, ndc, camera.fov_y_deg, camera.aspect) else {
            warn!(ndc_x = ndc.x, ndc_y = ndc.y, "INPUT_CLICK_DEGENERATE: ピッキング用の半直線を作成できません");
            return;
        };

        if self.agent.is_selected() {
            match self.ground.intersect(&ray) {
                Some(point) => self.issue_goal(point),
                None => debug!(ndc_x = ndc.x, ndc_y = ndc.y, "INPUT_CLICK_MISSED: 地面に当たりませんでした"),
            }
            return;
        }

        let hit = self
            .agent
            .position()
            .and_then(|position| ray.intersect_aabb(&self.agent.collider().aabb_at(position)));
        if hit.is_some() {
            self.agent.select();
        }
    }

    /// 実行結果を表示
    pub fn print_report(&self) {
        let position = self.agent.position().unwrap_or_default();

        println!();
        println!("=== 実行結果 ===");
        println!("経過時間: {:.2}秒 ({}ステップ)", self.current_time, self.step_count);
        println!("クランプされたフレーム: {}", self.stats.clamped_frames);
        println!(
            "目標指示: {}件 (受付: {}, 無視: {})",
            self.stats.goals_issued, self.stats.goals_accepted, self.stats.goals_rejected
        );
        println!("到達: {}回 / 行き過ぎ停止: {}回", self.stats.arrivals, self.stats.overshoot_stops);
        println!("選択解除による目標クリア: {}回", self.stats.deselect_clears);
        println!("水平移動距離: {:.2}", self.stats.distance_travelled);
        println!("最終位置: ({:.3}, {:.3}, {:.3})", position.x, position.y, position.z);
        println!("最終状態: {:?}", self.agent.selection());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{AgentConfig, SimulationConfig, WorldConfig};
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn scenario(mode: ControlMode, goal: DVec3, t_max_s: f64) -> ScenarioConfig {
        ScenarioConfig {
            sim: SimulationConfig {
                t_max_s,
                ..SimulationConfig::default()
            },
            agent: AgentConfig {
                mode,
                selected: true,
                ..AgentConfig::default()
            },
            inputs: vec![ScheduledInput {
                t_s: 0.0,
                command: InputCommand::Goal { point: goal },
            }],
            ..ScenarioConfig::default()
        }
    }

    fn planar_distance(engine: &SimulationEngine, goal: DVec3) -> f64 {
        (engine.agent.position().unwrap_or_default() - goal).planar_length()
    }

    #[test]
    fn test_run_requires_initialize() {
        let mut engine = SimulationEngine::new(ScenarioConfig::default(), 0);
        assert!(matches!(engine.run(), Err(SimulationError::NotInitialized)));
    }

    #[rstest]
    #[case(ControlMode::Kinematic)]
    #[case(ControlMode::Force)]
    fn test_agent_reaches_goal(#[case] mode: ControlMode) {
        let goal = DVec3::new(4.0, 0.0, -2.0);
        let mut engine = SimulationEngine::new(scenario(mode, goal, 8.0), 0);
        engine.initialize().unwrap();

        let stats = engine.run().unwrap();

        assert_eq!(stats.arrivals + stats.overshoot_stops, 1);
        assert_eq!(engine.agent.target(), None);
        assert_eq!(engine.agent.selection(), SelectionState::Selected);
        assert!(planar_distance(&engine, goal) < engine.controller.params.stop_distance_threshold);
        let velocity = engine.agent.velocity().unwrap_or_default();
        assert!(velocity.planar_length() < 1e-9);
    }

    #[test]
    fn test_kinematic_agent_stays_on_ground() {
        let goal = DVec3::new(2.0, 0.0, 0.0);
        let mut engine = SimulationEngine::new(scenario(ControlMode::Kinematic, goal, 2.0), 0);
        engine.initialize().unwrap();
        engine.run().unwrap();

        let position = engine.agent.position().unwrap_or_default();
        assert_relative_eq!(engine.agent.collider().feet_height(position), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_kinematic_agent_steps_onto_curb() {
        let goal = DVec3::new(2.5, 0.0, 0.0);
        let mut config = scenario(ControlMode::Kinematic, goal, 3.0);
        config.world = WorldConfig {
            obstacles: vec![Aabb::new(DVec3::new(1.0, 0.0, -3.0), DVec3::new(4.0, 0.2, 3.0))],
            ..WorldConfig::default()
        };
        let mut engine = SimulationEngine::new(config, 0);
        engine.initialize().unwrap();
        engine.run().unwrap();

        let position = engine.agent.position().unwrap_or_default();
        assert!(planar_distance(&engine, goal) < 0.15);
        assert_relative_eq!(engine.agent.collider().feet_height(position), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_kinematic_agent_blocked_by_wall_keeps_goal() {
        let goal = DVec3::new(5.0, 0.0, 0.0);
        let mut config = scenario(ControlMode::Kinematic, goal, 2.0);
        config.world = WorldConfig {
            obstacles: vec![Aabb::new(DVec3::new(2.0, 0.0, -5.0), DVec3::new(3.0, 3.0, 5.0))],
            ..WorldConfig::default()
        };
        let mut engine = SimulationEngine::new(config, 0);
        engine.initialize().unwrap();
        engine.run().unwrap();

        let position = engine.agent.position().unwrap_or_default();
        assert_relative_eq!(position.x, 2.0 - 0.61, epsilon = 1e-9);
        assert_eq!(engine.agent.target(), Some(goal));
    }

    #[test]
    fn test_goal_before_selection_is_rejected() {
        let mut config = scenario(ControlMode::Kinematic, DVec3::new(3.0, 0.0, 0.0), 1.0);
        config.agent.selected = false;
        let mut engine = SimulationEngine::new(config, 0);
        engine.initialize().unwrap();

        let stats = engine.run().unwrap();

        assert_eq!(stats.goals_rejected, 1);
        assert_eq!(stats.goals_accepted, 0);
        assert!(stats.distance_travelled < 1e-9);
    }

    #[test]
    fn test_deselect_mid_route_stops_movement() {
        let mut config = scenario(ControlMode::Kinematic, DVec3::new(10.0, 0.0, 0.0), 2.0);
        config.inputs.push(ScheduledInput {
            t_s: 0.5,
            command: InputCommand::Deselect,
        });
        let mut engine = SimulationEngine::new(config, 0);
        engine.initialize().unwrap();

        let stats = engine.run().unwrap();

        assert_eq!(stats.deselect_clears, 1);
        assert_eq!(engine.agent.selection(), SelectionState::Unselected);
        // 0.5秒間、毎秒5の速さで移動した分だけ
        assert!(stats.distance_travelled > 2.0 && stats.distance_travelled < 3.0);
    }

    #[test]
    fn test_inputs_apply_before_control_in_same_frame() {
        let mut engine = SimulationEngine::new(scenario(ControlMode::Kinematic, DVec3::new(3.0, 0.0, 0.0), 1.0), 0);
        engine.initialize().unwrap();

        engine.step(0.1);

        // 最初のフレームで目標が適用され、そのフレームのうちに移動している
        assert_relative_eq!(engine.agent.position().unwrap_or_default().x, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_hitch_is_clamped() {
        let mut config = scenario(ControlMode::Kinematic, DVec3::new(10.0, 0.0, 0.0), 1.0);
        config.sim.hitches = vec![FrameHitch { t_s: 0.0, dt_s: 0.75 }];
        let mut engine = SimulationEngine::new(config, 0);
        engine.initialize().unwrap();

        let raw = engine.next_frame_dt();
        let used = engine.step(raw);

        assert_relative_eq!(used, 0.1);
        assert_eq!(engine.stats.clamped_frames, 1);
        assert_relative_eq!(engine.agent.position().unwrap_or_default().x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(engine.next_frame_dt(), 1.0 / 60.0);
    }

    #[test]
    fn test_click_selects_then_sets_goal() {
        let mut config = scenario(ControlMode::Kinematic, DVec3::ZERO, 1.0);
        config.agent.selected = false;
        config.inputs.clear();
        config.camera.eye = DVec3::new(0.0, 10.0, 10.0);
        config.camera.look_at = DVec3::new(0.0, 1.5, 0.0);
        let mut engine = SimulationEngine::new(config, 0);
        engine.initialize().unwrap();

        engine.apply_input(InputCommand::Click { ndc: DVec2::ZERO });
        assert_eq!(engine.agent.selection(), SelectionState::Selected);

        engine.apply_input(InputCommand::Click { ndc: DVec2::new(0.3, -0.2) });
        let target = engine.agent.target().unwrap_or_default();
        assert_eq!(engine.stats.goals_accepted, 1);
        assert_eq!(target.y, 0.0);
        assert!(target.x > 0.0);
    }

    #[test]
    fn test_click_missing_agent_does_not_select() {
        let mut config = scenario(ControlMode::Kinematic, DVec3::ZERO, 1.0);
        config.agent.selected = false;
        let mut engine = SimulationEngine::new(config, 0);
        engine.initialize().unwrap();

        engine.apply_input(InputCommand::Click { ndc: DVec2::new(0.95, 0.95) });

        assert_eq!(engine.agent.selection(), SelectionState::Unselected);
    }

    #[rstest]
    #[case(ControlMode::Kinematic)]
    #[case(ControlMode::Force)]
    fn test_demo_scenario_runs(#[case] mode: ControlMode) {
        let mut engine = SimulationEngine::new(ScenarioConfig::demo(mode), 0);
        engine.initialize().unwrap();

        let stats = engine.run().unwrap();

        assert_eq!(stats.goals_issued, 3);
        assert!(stats.arrivals + stats.overshoot_stops >= 1);
        assert_eq!(stats.clamped_frames, 1);
        assert_eq!(engine.agent.selection(), SelectionState::Unselected);
    }
}
