//! # Physics モジュール
//!
//! 移動制御が利用する物理エンジン側の最小実装です。
//!
//! - [`SimBody`]: 質点剛体（動的 / 位置ベースのキネマティック）
//! - [`PhysicsWorld`]: 重力・減衰・地面接触を含む1ステップの積分
//! - [`SlideResolver`]: 箱形障害物に対する move and slide（段差乗り越え・地面吸着付き）

use crate::models::{
    common::{Aabb, BodyKind, Collider, DEFAULT_GRAVITY},
    traits::{ICollisionSweep, IRigidBody},
};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// 接触判定の許容誤差
const CONTACT_EPSILON: f64 = 1e-9;

/// シミュレーション用の剛体
#[derive(Debug, Clone)]
pub struct SimBody {
    kind: BodyKind,
    translation: DVec3,
    linvel: DVec3,
    /// 次ステップで作用する力の累積（ステップ後にリセット）
    force: DVec3,
    /// キネマティック剛体の次ステップ位置
    next_translation: Option<DVec3>,
    collider: Collider,
    pub mass: f64,
    pub linear_damping: f64,
}

impl SimBody {
    pub fn new(kind: BodyKind, translation: DVec3, collider: Collider) -> Self {
        Self {
            kind,
            translation,
            linvel: DVec3::ZERO,
            force: DVec3::ZERO,
            next_translation: None,
            collider,
            mass: 1.0,
            linear_damping: 0.0,
        }
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_linear_damping(mut self, damping: f64) -> Self {
        self.linear_damping = damping;
        self
    }

    /// 位置を直接設定（テレポート）
    pub fn set_translation(&mut self, translation: DVec3) {
        self.translation = translation;
        self.next_translation = None;
    }

    /// 次ステップで作用する力の累積値
    pub fn accumulated_force(&self) -> DVec3 {
        self.force
    }

    pub fn next_kinematic_translation(&self) -> Option<DVec3> {
        self.next_translation
    }
}

impl IRigidBody for SimBody {
    fn translation(&self) -> DVec3 {
        self.translation
    }

    fn linvel(&self) -> DVec3 {
        self.linvel
    }

    fn set_linvel(&mut self, velocity: DVec3) {
        self.linvel = velocity;
    }

    fn add_force(&mut self, force: DVec3) {
        self.force += force;
    }

    fn set_next_kinematic_translation(&mut self, translation: DVec3) {
        self.next_translation = Some(translation);
    }

    fn body_kind(&self) -> BodyKind {
        self.kind
    }
}

/// 物理ワールド
///
/// 平らな地面（`ground_height`）と静的な箱形障害物を持ちます。
/// 動的剛体は地面とのみ接触し、障害物との衝突はキャラクターコントローラー
/// （[`SlideResolver`]）が扱います。
#[derive(Debug, Clone)]
pub struct PhysicsWorld {
    pub gravity: DVec3,
    pub ground_height: f64,
    pub obstacles: Vec<Aabb>,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(DEFAULT_GRAVITY, 0.0, Vec::new())
    }
}

impl PhysicsWorld {
    pub fn new(gravity: DVec3, ground_height: f64, obstacles: Vec<Aabb>) -> Self {
        Self {
            gravity,
            ground_height,
            obstacles,
        }
    }

    /// このワールドの障害物を参照するキャラクターコントローラーを作成
    pub fn create_character_controller(&self, config: CharacterControllerConfig) -> SlideResolver {
        SlideResolver {
            config,
            ground_height: self.ground_height,
            obstacles: self.obstacles.clone(),
        }
    }

    /// 剛体を1ステップ進める
    ///
    /// 動的剛体: 力と重力による半陰的オイラー積分、線形減衰、地面接触。
    /// キネマティック剛体: 設定済みの次位置へ移動し、その変位から速度を求める。
    pub fn step(&self, body: &mut SimBody, dt: f64) {
        if dt <= 0.0 {
            return;
        }

        match body.kind {
            BodyKind::Dynamic => self.step_dynamic(body, dt),
            BodyKind::KinematicPositionBased => Self::step_kinematic(body, dt),
        }
    }

    fn step_dynamic(&self, body: &mut SimBody, dt: f64) {
        let acceleration = if body.mass > 0.0 {
            body.force / body.mass + self.gravity
        } else {
            self.gravity
        };

        body.linvel += acceleration * dt;
        body.linvel *= 1.0 / (1.0 + body.linear_damping * dt);
        body.translation += body.linvel * dt;

        // 地面接触
        let feet = body.collider.feet_height(body.translation);
        if feet < self.ground_height {
            body.translation.y = self.ground_height + body.collider.half_extents.y;
            if body.linvel.y < 0.0 {
                body.linvel.y = 0.0;
            }
        }

        body.force = DVec3::ZERO;
    }

    fn step_kinematic(body: &mut SimBody, dt: f64) {
        match body.next_translation.take() {
            Some(next) => {
                body.linvel = (next - body.translation) / dt;
                body.translation = next;
            }
            None => body.linvel = DVec3::ZERO,
        }
    }
}

/// キャラクターコントローラーの設定
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CharacterControllerConfig {
    /// 障害物との間に保つ隙間
    pub offset: f64,
    /// 自動で乗り越えられる段差の最大高さ
    pub autostep_max_height: f64,
    /// 段差の上面に必要な最小の奥行き
    pub autostep_min_width: f64,
    /// 地面に吸着する最大距離
    pub snap_to_ground: f64,
}

impl Default for CharacterControllerConfig {
    fn default() -> Self {
        Self {
            offset: 0.01,
            autostep_max_height: 0.3,
            autostep_min_width: 0.2,
            snap_to_ground: 0.5,
        }
    }
}

/// 箱形障害物に対する move and slide
///
/// 水平移動はX軸、Z軸の順に個別に解決します。ある軸で障害物にぶつかった場合は
/// その軸の移動を接触面で止め、もう一方の軸の移動はそのまま残すため、
/// 壁に沿って滑るように動きます。
#[derive(Debug, Clone)]
pub struct SlideResolver {
    pub config: CharacterControllerConfig,
    pub ground_height: f64,
    pub obstacles: Vec<Aabb>,
}

impl SlideResolver {
    /// 1軸分の水平移動を解決し、移動後の位置を返す
    fn resolve_axis(&self, collider: &Collider, position: DVec3, axis: usize, delta: f64) -> DVec3 {
        let mut candidate = position;
        candidate[axis] += delta;
        if delta == 0.0 {
            return candidate;
        }

        let other = if axis == 0 { 2 } else { 0 };
        let margin = collider.half_extents + DVec3::splat(self.config.offset);

        for obstacle in &self.obstacles {
            let inflated = obstacle.expanded(margin);
            let feet = collider.feet_height(candidate);
            let head = candidate.y + collider.half_extents.y;

            // 上に乗っている、または頭上にある障害物は無関係
            if obstacle.max.y <= feet + CONTACT_EPSILON || obstacle.min.y >= head {
                continue;
            }
            // 他軸で重なっていなければ無関係
            if candidate[other] <= inflated.min[other] || candidate[other] >= inflated.max[other] {
                continue;
            }
            // 移動区間が障害物の区間と重なるか
            let lo = position[axis].min(candidate[axis]);
            let hi = position[axis].max(candidate[axis]);
            if hi <= inflated.min[axis] || lo >= inflated.max[axis] {
                continue;
            }

            let step_height = obstacle.max.y - feet;
            let depth = obstacle.max[axis] - obstacle.min[axis];
            if step_height <= self.config.autostep_max_height && depth >= self.config.autostep_min_width {
                trace!(
                    step_height,
                    obstacle_top = obstacle.max.y,
                    "CHARACTER_AUTOSTEP: 段差を乗り越えました"
                );
                candidate.y += step_height;
                continue;
            }

            let contact = if delta > 0.0 {
                inflated.min[axis]
            } else {
                inflated.max[axis]
            };
            // 接触面で止める（後退はさせない）
            candidate[axis] = if (contact - position[axis]) * delta < 0.0 {
                position[axis]
            } else {
                contact
            };
        }

        candidate
    }

    /// 足元を支える面の高さ（地面または乗っている障害物の上面）
    fn support_height(&self, collider: &Collider, position: DVec3) -> f64 {
        let feet = collider.feet_height(position);
        let footprint = DVec3::new(collider.half_extents.x, 0.0, collider.half_extents.z);

        self.obstacles
            .iter()
            .filter(|o| o.expanded(footprint).contains_xz(position))
            .filter(|o| o.max.y <= feet + CONTACT_EPSILON)
            .map(|o| o.max.y)
            .fold(self.ground_height, f64::max)
    }
}

impl ICollisionSweep for SlideResolver {
    fn compute_movement(&self, collider: &Collider, position: DVec3, desired: DVec3) -> DVec3 {
        let mut resolved = self.resolve_axis(collider, position, 0, desired.x);
        resolved = self.resolve_axis(collider, resolved, 2, desired.z);

        let support = self.support_height(collider, resolved);
        let feet = collider.feet_height(resolved);
        let target_feet = feet + desired.y;

        let dy = if target_feet < support {
            support - feet
        } else if desired.y <= 0.0 && target_feet - support <= self.config.snap_to_ground {
            support - feet
        } else {
            desired.y
        };
        resolved.y += dy;

        resolved - position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn standing_at(x: f64, z: f64) -> DVec3 {
        DVec3::new(x, Collider::default().half_extents.y, z)
    }

    fn wall() -> Aabb {
        // x = 2..3 の背の高い壁
        Aabb::new(DVec3::new(2.0, 0.0, -10.0), DVec3::new(3.0, 5.0, 10.0))
    }

    #[test]
    fn test_dynamic_body_accelerates_with_force() {
        let world = PhysicsWorld::default();
        let mut body = SimBody::new(BodyKind::Dynamic, standing_at(0.0, 0.0), Collider::default()).with_mass(2.0);
        body.add_force(DVec3::new(4.0, 0.0, 0.0));

        world.step(&mut body, 0.5);

        assert_relative_eq!(body.linvel().x, 1.0);
        assert_relative_eq!(body.translation().x, 0.5);
        assert_eq!(body.accumulated_force(), DVec3::ZERO);
    }

    #[test]
    fn test_dynamic_body_rests_on_ground() {
        let world = PhysicsWorld::default();
        let mut body = SimBody::new(BodyKind::Dynamic, standing_at(0.0, 0.0), Collider::default());

        for _ in 0..10 {
            world.step(&mut body, 1.0 / 60.0);
        }

        assert_relative_eq!(body.translation().y, 1.5);
        assert_relative_eq!(body.linvel().y, 0.0);
    }

    #[test]
    fn test_linear_damping_slows_body() {
        let world = PhysicsWorld::new(DVec3::ZERO, 0.0, Vec::new());
        let mut body =
            SimBody::new(BodyKind::Dynamic, standing_at(0.0, 0.0), Collider::default()).with_linear_damping(1.0);
        body.set_linvel(DVec3::new(2.0, 0.0, 0.0));

        world.step(&mut body, 1.0);

        assert_relative_eq!(body.linvel().x, 1.0);
    }

    #[test]
    fn test_kinematic_body_reports_displacement_velocity() {
        let world = PhysicsWorld::default();
        let mut body = SimBody::new(BodyKind::KinematicPositionBased, standing_at(0.0, 0.0), Collider::default());
        body.set_next_kinematic_translation(standing_at(0.5, 0.0));

        world.step(&mut body, 0.1);
        assert_relative_eq!(body.translation().x, 0.5);
        assert_relative_eq!(body.linvel().x, 5.0);

        world.step(&mut body, 0.1);
        assert_eq!(body.linvel(), DVec3::ZERO);
    }

    #[test]
    fn test_free_movement_is_unchanged() {
        let resolver = PhysicsWorld::default().create_character_controller(CharacterControllerConfig::default());
        let moved = resolver.compute_movement(&Collider::default(), standing_at(0.0, 0.0), DVec3::new(0.3, 0.0, -0.2));
        assert_relative_eq!(moved.x, 0.3);
        assert_relative_eq!(moved.y, 0.0);
        assert_relative_eq!(moved.z, -0.2);
    }

    #[test]
    fn test_gravity_does_not_push_below_ground() {
        let resolver = PhysicsWorld::default().create_character_controller(CharacterControllerConfig::default());
        let moved = resolver.compute_movement(&Collider::default(), standing_at(0.0, 0.0), DVec3::new(0.0, -0.16, 0.0));
        assert_relative_eq!(moved.y, 0.0);
    }

    #[test]
    fn test_snaps_down_to_ground_within_range() {
        let resolver = PhysicsWorld::default().create_character_controller(CharacterControllerConfig::default());
        let hovering = standing_at(0.0, 0.0) + DVec3::new(0.0, 0.4, 0.0);
        let moved = resolver.compute_movement(&Collider::default(), hovering, DVec3::new(0.0, -0.01, 0.0));
        assert_relative_eq!(moved.y, -0.4);
    }

    #[test]
    fn test_falls_freely_when_high_above_ground() {
        let resolver = PhysicsWorld::default().create_character_controller(CharacterControllerConfig::default());
        let airborne = standing_at(0.0, 0.0) + DVec3::new(0.0, 5.0, 0.0);
        let moved = resolver.compute_movement(&Collider::default(), airborne, DVec3::new(0.0, -0.16, 0.0));
        assert_relative_eq!(moved.y, -0.16);
    }

    #[test]
    fn test_wall_blocks_and_slides_along_face() {
        let world = PhysicsWorld::new(DEFAULT_GRAVITY, 0.0, vec![wall()]);
        let resolver = world.create_character_controller(CharacterControllerConfig::default());
        let collider = Collider::default();
        let start = standing_at(1.0, 0.0);

        let moved = resolver.compute_movement(&collider, start, DVec3::new(1.0, 0.0, 0.5));

        // 壁面 x = 2 から半幅0.6と隙間0.01だけ手前で停止
        assert_relative_eq!(start.x + moved.x, 2.0 - 0.6 - 0.01, epsilon = 1e-9);
        assert_relative_eq!(moved.z, 0.5);
    }

    #[test]
    fn test_no_movement_when_already_in_contact() {
        let world = PhysicsWorld::new(DEFAULT_GRAVITY, 0.0, vec![wall()]);
        let resolver = world.create_character_controller(CharacterControllerConfig::default());
        let touching = standing_at(2.0 - 0.61, 0.0);

        let moved = resolver.compute_movement(&Collider::default(), touching, DVec3::new(0.2, 0.0, 0.0));

        assert_relative_eq!(moved.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_autostep_climbs_low_obstacle() {
        let curb = Aabb::new(DVec3::new(1.0, 0.0, -2.0), DVec3::new(3.0, 0.25, 2.0));
        let world = PhysicsWorld::new(DEFAULT_GRAVITY, 0.0, vec![curb]);
        let resolver = world.create_character_controller(CharacterControllerConfig::default());
        let collider = Collider::default();
        let start = standing_at(0.0, 0.0);

        let moved = resolver.compute_movement(&collider, start, DVec3::new(0.5, -0.16, 0.0));

        assert_relative_eq!(moved.x, 0.5);
        assert_relative_eq!(collider.feet_height(start + moved), 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_autostep_rejects_tall_obstacle() {
        let ledge = Aabb::new(DVec3::new(1.0, 0.0, -2.0), DVec3::new(3.0, 0.5, 2.0));
        let world = PhysicsWorld::new(DEFAULT_GRAVITY, 0.0, vec![ledge]);
        let resolver = world.create_character_controller(CharacterControllerConfig::default());
        let start = standing_at(0.0, 0.0);

        let moved = resolver.compute_movement(&Collider::default(), start, DVec3::new(0.5, 0.0, 0.0));

        assert_relative_eq!(start.x + moved.x, 1.0 - 0.61, epsilon = 1e-9);
        assert_relative_eq!(moved.y, 0.0);
    }

    #[test]
    fn test_autostep_rejects_narrow_obstacle() {
        let rail = Aabb::new(DVec3::new(1.0, 0.0, -2.0), DVec3::new(1.1, 0.2, 2.0));
        let world = PhysicsWorld::new(DEFAULT_GRAVITY, 0.0, vec![rail]);
        let resolver = world.create_character_controller(CharacterControllerConfig::default());
        let start = standing_at(0.0, 0.0);

        let moved = resolver.compute_movement(&Collider::default(), start, DVec3::new(0.5, 0.0, 0.0));

        assert!(start.x + moved.x < 1.0 - 0.6);
    }
}
