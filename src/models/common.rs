use glam::DVec3;
use serde::{Deserialize, Serialize};

/// 方向ベクトルがこれ未満の長さなら「既に目標上」とみなす（正規化前のゼロ除算防止）
pub const DEGENERATE_DISTANCE: f64 = 1e-9;

/// フレーム時間刻みの上限（秒）。フレーム落ち時の積分誤差を抑える
pub const DEFAULT_MAX_DT_S: f64 = 0.1;

/// 標準重力加速度（m/s²）
pub const DEFAULT_GRAVITY: DVec3 = DVec3::new(0.0, -9.81, 0.0);

/// 水平面（XZ平面）に関するベクトル演算
///
/// 移動制御はY成分（落下・ジャンプ）を扱わず、XZ成分のみで計算します。
pub trait PlanarExt {
    /// Y成分を0にしたベクトル
    fn planar(self) -> DVec3;

    /// XZ平面での長さ
    fn planar_length(self) -> f64;

    /// Y成分を保持したまま、XZ成分を`planar`のものに置き換える
    fn with_planar(self, planar: DVec3) -> DVec3;
}

impl PlanarExt for DVec3 {
    fn planar(self) -> DVec3 {
        DVec3::new(self.x, 0.0, self.z)
    }

    fn planar_length(self) -> f64 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    fn with_planar(self, planar: DVec3) -> DVec3 {
        DVec3::new(planar.x, self.y, planar.z)
    }
}

/// ワールド座標の点を地面（y = 0）へ投影
pub fn project_to_ground(point: DVec3) -> DVec3 {
    DVec3::new(point.x, 0.0, point.z)
}

/// 移動制御モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// 力制御（動的剛体に制動力・推進力を加える）
    Force,
    /// キネマティック制御（希望移動量を衝突解決器で補正して次位置を設定）
    #[default]
    Kinematic,
}

/// 剛体の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    KinematicPositionBased,
}

impl From<ControlMode> for BodyKind {
    fn from(mode: ControlMode) -> Self {
        match mode {
            ControlMode::Force => BodyKind::Dynamic,
            ControlMode::Kinematic => BodyKind::KinematicPositionBased,
        }
    }
}

/// 目標がクリアされた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 停止距離内に到達した
    Arrived,
    /// 目標を通り過ぎた（速度が目標方向と逆向き）
    Overshoot,
    /// 選択解除された
    Deselected,
    /// 明示的にクリアされた
    Cleared,
}

/// 軸平行境界ボックス
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// 中心と半径（各軸の半分の大きさ）から作成
    pub fn from_center(center: DVec3, half_extents: DVec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// 各軸を`margin`だけ膨らませたボックス
    pub fn expanded(&self, margin: DVec3) -> Self {
        Self::new(self.min - margin, self.max + margin)
    }

    pub fn is_valid(&self) -> bool {
        self.min.x < self.max.x && self.min.y < self.max.y && self.min.z < self.max.z
    }

    /// 点がXZ平面で内部にあるか（境界上は含まない）
    pub fn contains_xz(&self, point: DVec3) -> bool {
        point.x > self.min.x && point.x < self.max.x && point.z > self.min.z && point.z < self.max.z
    }
}

/// 衝突形状のハンドル（箱形）
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Collider {
    /// 各軸の半分の大きさ
    pub half_extents: DVec3,
}

impl Collider {
    pub fn cuboid(half_extents: DVec3) -> Self {
        Self { half_extents }
    }

    /// 指定位置（中心）での境界ボックス
    pub fn aabb_at(&self, center: DVec3) -> Aabb {
        Aabb::from_center(center, self.half_extents)
    }

    /// 中心位置から足元の高さ
    pub fn feet_height(&self, center: DVec3) -> f64 {
        center.y - self.half_extents.y
    }
}

impl Default for Collider {
    fn default() -> Self {
        Self::cuboid(DVec3::new(0.6, 1.5, 0.4))
    }
}

/// 移動制御パラメータ
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MovementParams {
    /// 停止判定距離
    pub stop_distance_threshold: f64,
    /// 停止判定速度（キネマティック制御）
    pub stop_speed_threshold: f64,
    /// 行き過ぎ判定距離（停止判定距離より大きい二次閾値）
    pub overshoot_distance_threshold: f64,
    /// 距離あたりの推進力（キネマティック制御では移動速度）
    pub force_factor: f64,
    /// 推進力の上限
    pub max_force: f64,
    /// 制動ゲイン k
    pub brake_gain: f64,
    /// 制動式の分母に加える ε
    pub brake_epsilon: f64,
    /// これを超える水平速度で制動が働く
    pub moving_speed_epsilon: f64,
    /// これ未満の水平速度で推進が働く
    pub low_speed_threshold: f64,
    /// これを超える距離で推進が働く
    pub min_propulsion_distance: f64,
}

impl Default for MovementParams {
    fn default() -> Self {
        Self {
            stop_distance_threshold: 0.15,
            stop_speed_threshold: 0.1,
            overshoot_distance_threshold: 0.5,
            force_factor: 5.0,
            max_force: 20.0,
            brake_gain: 1.0,
            brake_epsilon: 0.01,
            moving_speed_epsilon: 0.01,
            low_speed_threshold: 2.0,
            min_propulsion_distance: 0.1,
        }
    }
}
