use crate::models::common::*;
use glam::DVec3;

/// シミュレーション上のエージェントが実装する基本インターフェース
pub trait IAgent {
    /// エージェントIDの取得
    fn get_id(&self) -> String;

    /// 物理ハンドルが接続され、操作可能かどうか
    fn is_active(&self) -> bool;
}

/// 剛体ハンドルのインターフェース
///
/// 物理エンジン側が所有する剛体への窓口です。移動制御はこのトレイト越しにのみ
/// 位置・速度を読み書きします。
pub trait IRigidBody {
    /// 現在位置の取得
    fn translation(&self) -> DVec3;

    /// 現在速度の取得（キネマティック剛体では直前ステップの変位から求めた速度）
    fn linvel(&self) -> DVec3;

    /// 速度の設定
    fn set_linvel(&mut self, velocity: DVec3);

    /// 次の物理ステップで作用する力を加算
    fn add_force(&mut self, force: DVec3);

    /// 次の物理ステップで移動する位置を設定（キネマティック剛体用）
    fn set_next_kinematic_translation(&mut self, translation: DVec3);

    /// 剛体の種類
    fn body_kind(&self) -> BodyKind;
}

/// 衝突を考慮した移動量補正（move and slide）のインターフェース
pub trait ICollisionSweep {
    /// `position`にある`collider`を`desired`だけ動かしたとき、
    /// 障害物・段差・地面を考慮して実際に移動できる変位を返す
    fn compute_movement(&self, collider: &Collider, position: DVec3, desired: DVec3) -> DVec3;
}
