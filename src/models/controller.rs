use crate::models::{
    agent::Agent,
    common::{ControlMode, DEGENERATE_DISTANCE, MovementParams, PlanarExt, StopReason},
    traits::{ICollisionSweep, IRigidBody},
};
use glam::DVec3;
use tracing::{debug, info, trace};

/// 1ティック分の制御結果
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlOutput {
    /// 加えた制動力（力制御）
    pub brake_force: Option<DVec3>,
    /// 加えた推進力（力制御）
    pub propulsion_force: Option<DVec3>,
    /// 希望移動量（キネマティック制御）
    pub desired_movement: Option<DVec3>,
    /// 衝突解決後の移動量（キネマティック制御）
    pub corrected_movement: Option<DVec3>,
    /// このティックで目標がクリアされた場合の理由
    pub stopped: Option<StopReason>,
}

impl ControlOutput {
    fn stopped(reason: StopReason) -> Self {
        Self {
            stopped: Some(reason),
            ..Self::default()
        }
    }
}

/// 移動制御
///
/// エージェントの現在位置・速度と目標地点から、力制御では制動力と推進力を、
/// キネマティック制御では衝突解決前の希望移動量を計算します。
///
/// 1フレームの処理順序:
///
/// 1. [`before_step`](Self::before_step) — 力を加える / 次位置を設定する
/// 2. 物理ステップ
/// 3. [`after_step`](Self::after_step) — キネマティック制御の停止判定
#[derive(Debug, Clone, Copy)]
pub struct MovementController {
    pub mode: ControlMode,
    pub params: MovementParams,
}

impl MovementController {
    pub fn new(mode: ControlMode, params: MovementParams) -> Self {
        Self { mode, params }
    }

    /// 物理ステップ前の処理
    pub fn before_step<B: IRigidBody>(
        &self,
        agent: &mut Agent<B>,
        dt: f64,
        gravity: DVec3,
        sweep: &dyn ICollisionSweep,
    ) -> ControlOutput {
        match self.mode {
            ControlMode::Force => self.apply_forces(agent),
            ControlMode::Kinematic => self.move_kinematic(agent, dt, gravity, sweep),
        }
    }

    /// 物理ステップ後の処理
    ///
    /// キネマティック制御では、物理ステップで報告された速度を用いて停止判定を
    /// やり直します。力制御の停止判定は[`apply_forces`](Self::apply_forces)が行うため、
    /// ここでは何もしません。
    pub fn after_step<B: IRigidBody>(&self, agent: &mut Agent<B>) -> Option<StopReason> {
        if self.mode != ControlMode::Kinematic {
            return None;
        }

        let target = agent.target()?;
        let body = agent.body()?;
        let offset = (target - body.translation()).planar();
        let velocity = body.linvel().planar();
        let distance = offset.length();

        let reason = if distance < self.params.stop_distance_threshold
            && velocity.length() < self.params.stop_speed_threshold
        {
            Some(StopReason::Arrived)
        } else if self.is_overshooting(offset, velocity, distance) {
            Some(StopReason::Overshoot)
        } else {
            None
        };

        if let Some(reason) = reason {
            self.stop(agent, reason, distance);
        }
        reason
    }

    /// 力制御の1ティック
    ///
    /// 1. 目標なし → 何もしない
    /// 2. 停止距離内 → 水平速度を0にして目標をクリア
    /// 3. 目標を通り過ぎつつ近い → 同様に停止（反転させない）
    /// 4. 移動中なら距離が近いほど強い制動力を加える
    /// 5. 低速かつ十分遠ければ目標方向へ推進力を加える
    ///
    /// 4と5は同じティックで両方働くことがあります。制動で横滑りを抑えつつ、
    /// 推進で正味の前進力を与えます。
    pub fn apply_forces<B: IRigidBody>(&self, agent: &mut Agent<B>) -> ControlOutput {
        let Some(target) = agent.target() else {
            return ControlOutput::default();
        };
        let Some(body) = agent.body() else {
            return ControlOutput::default();
        };

        let offset = (target - body.translation()).planar();
        let velocity = body.linvel().planar();
        let distance = offset.length();
        let speed = velocity.length();

        if distance < self.params.stop_distance_threshold {
            self.stop(agent, StopReason::Arrived, distance);
            return ControlOutput::stopped(StopReason::Arrived);
        }

        if self.is_overshooting(offset, velocity, distance) {
            self.stop(agent, StopReason::Overshoot, distance);
            return ControlOutput::stopped(StopReason::Overshoot);
        }

        let mut output = ControlOutput::default();

        if speed > self.params.moving_speed_epsilon {
            output.brake_force = Some(self.brake_force(velocity, distance));
        }

        if speed < self.params.low_speed_threshold && distance > self.params.min_propulsion_distance {
            output.propulsion_force = self.propulsion_force(offset);
        }

        if let Some(body) = agent.body_mut() {
            for force in [output.brake_force, output.propulsion_force].into_iter().flatten() {
                body.add_force(force);
            }
        }

        trace!(
            agent_id = %agent.id,
            distance,
            speed,
            brake = ?output.brake_force,
            propulsion = ?output.propulsion_force,
            "CONTROL_FORCES: 制御力を加えました"
        );

        output
    }

    /// 制動力 `-v * max(1, k / (distance + ε))`
    pub fn brake_force(&self, planar_velocity: DVec3, distance: f64) -> DVec3 {
        let scale = (self.params.brake_gain / (distance + self.params.brake_epsilon)).max(1.0);
        -planar_velocity * scale
    }

    /// 推進力。方向は目標への単位ベクトル、大きさは `min(distance * force_factor, max_force)`
    ///
    /// 方向ベクトルの長さが0に近い場合は既に目標上とみなし`None`を返す
    pub fn propulsion_force(&self, planar_offset: DVec3) -> Option<DVec3> {
        let distance = planar_offset.length();
        if distance < DEGENERATE_DISTANCE {
            return None;
        }
        let magnitude = (distance * self.params.force_factor).min(self.params.max_force);
        Some(planar_offset / distance * magnitude)
    }

    /// キネマティック制御の希望移動量（速度ではなく変位）
    ///
    /// 重力による鉛直成分 `gravity * dt` から始め、目標があり水平距離が停止距離の
    /// 半分を超えていれば、目標方向に `force_factor * dt` の水平成分を加えます。
    pub fn calculate_desired_movement<B: IRigidBody>(&self, agent: &Agent<B>, dt: f64, gravity: DVec3) -> DVec3 {
        let mut movement = gravity * dt;

        let (Some(target), Some(position)) = (agent.target(), agent.position()) else {
            return movement;
        };

        let offset = (target - position).planar();
        let distance = offset.length();
        if distance > self.params.stop_distance_threshold * 0.5 && distance >= DEGENERATE_DISTANCE {
            let step = offset / distance * self.params.force_factor * dt;
            movement.x += step.x;
            movement.z += step.z;
        }

        movement
    }

    /// キネマティック制御の物理ステップ前処理
    ///
    /// 希望移動量を衝突解決器で補正し、補正後の位置を次ステップの位置として設定します。
    /// 選択・目標がなくても重力分の移動は行います（水平方向の移動は生じません）。
    fn move_kinematic<B: IRigidBody>(
        &self,
        agent: &mut Agent<B>,
        dt: f64,
        gravity: DVec3,
        sweep: &dyn ICollisionSweep,
    ) -> ControlOutput {
        let Some(position) = agent.position() else {
            return ControlOutput::default();
        };

        let desired = self.calculate_desired_movement(agent, dt, gravity);
        let corrected = sweep.compute_movement(agent.collider(), position, desired);

        if let Some(body) = agent.body_mut() {
            body.set_next_kinematic_translation(position + corrected);
        }

        trace!(
            agent_id = %agent.id,
            desired = ?desired,
            corrected = ?corrected,
            "CONTROL_KINEMATIC: 次位置を設定しました"
        );

        ControlOutput {
            desired_movement: Some(desired),
            corrected_movement: Some(corrected),
            ..ControlOutput::default()
        }
    }

    /// 速度が目標方向と逆向きで、かつ二次閾値より近いか
    fn is_overshooting(&self, planar_offset: DVec3, planar_velocity: DVec3, distance: f64) -> bool {
        planar_offset.dot(planar_velocity) < 0.0 && distance < self.params.overshoot_distance_threshold
    }

    /// 水平速度を0にし（Y成分は保持）、目標をクリア
    fn stop<B: IRigidBody>(&self, agent: &mut Agent<B>, reason: StopReason, distance: f64) {
        if let Some(body) = agent.body_mut() {
            let velocity = body.linvel();
            body.set_linvel(velocity.with_planar(DVec3::ZERO));
        }
        agent.finish_goal(reason);

        match reason {
            StopReason::Arrived => info!(
                agent_id = %agent.id,
                distance,
                mode = ?self.mode,
                "AGENT_ARRIVED: 目標地点に到達しました"
            ),
            _ => debug!(
                agent_id = %agent.id,
                distance,
                reason = ?reason,
                mode = ?self.mode,
                "AGENT_STOPPED: 目標手前で停止しました"
            ),
        }
    }
}
