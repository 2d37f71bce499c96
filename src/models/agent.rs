use crate::models::{
    common::{Collider, StopReason, project_to_ground},
    traits::{IAgent, IRigidBody},
};
use glam::DVec3;
use tracing::{debug, info};

/// 選択状態
///
/// 目標地点は選択中にしか存在しないため、`Moving`の内部に保持します。
/// 状態遷移:
///
/// ```text
/// Unselected --select--> Selected --set_goal--> Moving
///      ^                   ^  |                  |
///      |                   |  +----deselect------+--> Unselected（目標も同時にクリア）
///      |                   +--到達/行き過ぎ/clear--+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SelectionState {
    #[default]
    Unselected,
    Selected,
    /// 目標地点（Y = 0）に向かって移動中
    Moving { target: DVec3 },
}

/// 操作対象のキャラクター（ドワーフ）
///
/// 描画ノードを継承せず、物理ハンドルを`Option`で保持する合成として表現します。
/// 物理ハンドルが未接続の間は、移動に関わる操作はすべて何もしません。
#[derive(Debug, Clone)]
pub struct Agent<B> {
    pub id: String,
    body: Option<B>,
    collider: Collider,
    selection: SelectionState,
}

impl<B: IRigidBody> Agent<B> {
    /// 物理ハンドル未接続のエージェントを作成
    pub fn new(id: String, collider: Collider) -> Self {
        Self {
            id,
            body: None,
            collider,
            selection: SelectionState::Unselected,
        }
    }

    /// 物理ハンドルを接続
    ///
    /// 接続は一度だけ有効です。既に接続済みなら何もせず`false`を返します。
    pub fn attach_body(&mut self, body: B) -> bool {
        if self.body.is_some() {
            return false;
        }

        info!(
            agent_id = %self.id,
            position_x = body.translation().x,
            position_y = body.translation().y,
            position_z = body.translation().z,
            body_kind = ?body.body_kind(),
            "AGENT_PHYSICS_ATTACHED: 物理ハンドルが接続されました"
        );
        self.body = Some(body);
        true
    }

    pub fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut B> {
        self.body.as_mut()
    }

    pub fn collider(&self) -> &Collider {
        &self.collider
    }

    /// 現在位置（未接続なら`None`）
    pub fn position(&self) -> Option<DVec3> {
        self.body.as_ref().map(|b| b.translation())
    }

    /// 現在速度（未接続なら`None`）
    pub fn velocity(&self) -> Option<DVec3> {
        self.body.as_ref().map(|b| b.linvel())
    }

    pub fn selection(&self) -> SelectionState {
        self.selection
    }

    pub fn is_selected(&self) -> bool {
        !matches!(self.selection, SelectionState::Unselected)
    }

    /// 現在の目標地点
    pub fn target(&self) -> Option<DVec3> {
        match self.selection {
            SelectionState::Moving { target } => Some(target),
            _ => None,
        }
    }

    /// エージェントを選択（クリックで選択）。既に選択中なら状態を変えない
    pub fn select(&mut self) {
        if self.selection == SelectionState::Unselected {
            self.selection = SelectionState::Selected;
            info!(agent_id = %self.id, "AGENT_SELECTED: エージェントが選択されました");
        }
    }

    /// 選択解除（Escapeキー）。目標も同じ遷移でクリアし、クリアした目標を返す
    pub fn deselect(&mut self) -> Option<DVec3> {
        if self.selection == SelectionState::Unselected {
            return None;
        }

        let cleared = self.finish_goal(StopReason::Deselected);
        self.selection = SelectionState::Unselected;
        info!(
            agent_id = %self.id,
            had_goal = cleared.is_some(),
            "AGENT_DESELECTED: エージェントの選択が解除されました"
        );
        cleared
    }

    /// 目標地点を設定
    ///
    /// 選択中かつ物理ハンドル接続済みのときだけ有効です。`point`は地面（y = 0）に
    /// 投影され、以前の目標を一度の代入で置き換えます。速度は変更しません
    /// （移動は毎ティックの更新だけが行います）。
    ///
    /// # 戻り値
    ///
    /// 目標が受け付けられた場合は`true`
    pub fn set_goal(&mut self, point: DVec3) -> bool {
        if !self.is_selected() || self.body.is_none() {
            debug!(
                agent_id = %self.id,
                selected = self.is_selected(),
                attached = self.body.is_some(),
                "AGENT_GOAL_IGNORED: 目標指示は無視されました"
            );
            return false;
        }

        let target = project_to_ground(point);
        let previous = self.target();
        self.selection = SelectionState::Moving { target };

        info!(
            agent_id = %self.id,
            target_x = target.x,
            target_z = target.z,
            replaced = previous.is_some(),
            "AGENT_GOAL_SET: 目標地点が設定されました"
        );
        true
    }

    /// 目標を明示的にクリア（選択状態は保持）
    pub fn clear_goal(&mut self) -> Option<DVec3> {
        self.finish_goal(StopReason::Cleared)
    }

    /// 目標を終了して`Selected`に戻す
    pub(crate) fn finish_goal(&mut self, reason: StopReason) -> Option<DVec3> {
        let SelectionState::Moving { target } = self.selection else {
            return None;
        };
        self.selection = SelectionState::Selected;

        debug!(
            agent_id = %self.id,
            target_x = target.x,
            target_z = target.z,
            reason = ?reason,
            "AGENT_GOAL_CLEARED: 目標がクリアされました"
        );
        Some(target)
    }
}

impl<B: IRigidBody> IAgent for Agent<B> {
    fn get_id(&self) -> String {
        self.id.clone()
    }

    fn is_active(&self) -> bool {
        self.body.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{common::BodyKind, physics::SimBody};

    fn attached_agent() -> Agent<SimBody> {
        let collider = Collider::default();
        let mut agent = Agent::new("dwarf".to_string(), collider);
        agent.attach_body(SimBody::new(BodyKind::Dynamic, DVec3::new(0.0, 1.5, 0.0), collider));
        agent
    }

    #[test]
    fn test_goal_ignored_while_unselected() {
        let mut agent = attached_agent();
        assert!(!agent.set_goal(DVec3::new(4.0, 0.0, 1.0)));
        assert_eq!(agent.target(), None);
        assert_eq!(agent.selection(), SelectionState::Unselected);
    }

    #[test]
    fn test_goal_ignored_without_body() {
        let mut agent: Agent<SimBody> = Agent::new("dwarf".to_string(), Collider::default());
        agent.select();
        assert!(!agent.set_goal(DVec3::new(4.0, 0.0, 1.0)));
        assert_eq!(agent.target(), None);
        assert!(!agent.is_active());
    }

    #[test]
    fn test_goal_is_projected_onto_ground() {
        let mut agent = attached_agent();
        agent.select();
        assert!(agent.set_goal(DVec3::new(4.0, 2.7, -1.0)));
        assert_eq!(agent.target(), Some(DVec3::new(4.0, 0.0, -1.0)));
    }

    #[test]
    fn test_new_goal_replaces_previous() {
        let mut agent = attached_agent();
        agent.select();
        agent.set_goal(DVec3::new(4.0, 0.0, 1.0));
        agent.set_goal(DVec3::new(-2.0, 0.0, 3.0));
        assert_eq!(agent.selection(), SelectionState::Moving { target: DVec3::new(-2.0, 0.0, 3.0) });
    }

    #[test]
    fn test_deselect_clears_goal_in_same_transition() {
        let mut agent = attached_agent();
        agent.select();
        agent.set_goal(DVec3::new(4.0, 0.0, 1.0));

        assert_eq!(agent.deselect(), Some(DVec3::new(4.0, 0.0, 1.0)));
        assert_eq!(agent.selection(), SelectionState::Unselected);
        assert_eq!(agent.target(), None);
    }

    #[test]
    fn test_clear_goal_keeps_selection() {
        let mut agent = attached_agent();
        agent.select();
        agent.set_goal(DVec3::new(4.0, 0.0, 1.0));
        assert!(agent.clear_goal().is_some());
        assert_eq!(agent.selection(), SelectionState::Selected);
        assert_eq!(agent.clear_goal(), None);
    }

    #[test]
    fn test_body_attaches_only_once() {
        let mut agent = attached_agent();
        let other = SimBody::new(BodyKind::Dynamic, DVec3::new(9.0, 9.0, 9.0), Collider::default());
        assert!(!agent.attach_body(other));
        assert_eq!(agent.position(), Some(DVec3::new(0.0, 1.5, 0.0)));
    }
}
