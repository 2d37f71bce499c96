use crate::models::common::Aabb;
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// プレイヤー入力
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InputCommand {
    /// エージェントを選択
    Select,
    /// 選択解除（Escapeキー）
    Deselect,
    /// ワールド座標の目標地点を指示
    Goal { point: DVec3 },
    /// 画面上のクリック（正規化デバイス座標 -1..1）
    ///
    /// 選択中なら地面との交点を目標にし、未選択ならエージェントに当たったときに選択する
    Click { ndc: DVec2 },
    /// 目標のみクリア
    ClearGoal,
}

/// 時刻付きの入力
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScheduledInput {
    pub t_s: f64,
    pub command: InputCommand,
}

/// 半直線
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    /// 正規化済みの方向
    pub direction: DVec3,
}

impl Ray {
    /// 方向が長さ0なら`None`
    pub fn new(origin: DVec3, direction: DVec3) -> Option<Self> {
        let direction = direction.try_normalize()?;
        Some(Self { origin, direction })
    }

    /// 透視投影カメラから、画面上の点を通るピッキング用の半直線を作成
    ///
    /// # 引数
    ///
    /// * `eye` - カメラ位置
    /// * `look_at` - 注視点
    /// * `ndc` - 正規化デバイス座標（x: 右が正、y: 上が正、範囲 -1..1）
    /// * `fov_y_deg` - 垂直画角（度）
    /// * `aspect` - アスペクト比（幅 / 高さ）
    pub fn from_camera(eye: DVec3, look_at: DVec3, ndc: DVec2, fov_y_deg: f64, aspect: f64) -> Option<Self> {
        let forward = (look_at - eye).try_normalize()?;
        let right = forward.cross(DVec3::Y).try_normalize()?;
        let up = right.cross(forward);
        let tan_half = (fov_y_deg.to_radians() * 0.5).tan();

        let direction = forward + right * (ndc.x * tan_half * aspect) + up * (ndc.y * tan_half);
        Self::new(eye, direction)
    }

    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// 境界ボックスとの交差判定（スラブ法）。交差する場合は最初の交点までの距離を返す
    pub fn intersect_aabb(&self, aabb: &Aabb) -> Option<f64> {
        let mut t_min = 0.0_f64;
        let mut t_max = f64::INFINITY;

        for axis in 0..3 {
            let origin = self.origin[axis];
            let direction = self.direction[axis];
            if direction.abs() < 1e-12 {
                if origin < aabb.min[axis] || origin > aabb.max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (aabb.min[axis] - origin) / direction;
            let t2 = (aabb.max[axis] - origin) / direction;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }
}

/// 水平な地面（y = height）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GroundPlane {
    pub height: f64,
}

impl GroundPlane {
    pub fn new(height: f64) -> Self {
        Self { height }
    }

    /// 半直線と地面の交点。平行、または地面から離れる向きなら`None`
    pub fn intersect(&self, ray: &Ray) -> Option<DVec3> {
        if ray.direction.y.abs() < 1e-12 {
            return None;
        }
        let t = (self.height - ray.origin.y) / ray.direction.y;
        if t < 0.0 {
            return None;
        }
        Some(ray.at(t))
    }
}
