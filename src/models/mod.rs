// 基本的なデータ型とベクトルユーティリティ
pub mod common;

// 物理エンジンとの境界となるインターフェース（trait）定義
pub mod traits;

// エージェントと移動制御
pub mod agent;
pub mod controller;

// 物理エンジン側の実装と入力
pub mod physics;
pub mod input;

// 便利な re-export
pub use agent::{Agent, SelectionState};
pub use common::*;
pub use controller::{ControlOutput, MovementController};
pub use input::{GroundPlane, InputCommand, Ray, ScheduledInput};
pub use physics::{CharacterControllerConfig, PhysicsWorld, SimBody, SlideResolver};
pub use traits::*;
