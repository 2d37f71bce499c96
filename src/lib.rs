//! # dwarfsim
//!
//! クリックで選択したキャラクターを、地面上の目標地点まで移動させる移動制御の
//! シミュレーションです。力制御（動的剛体）とキネマティック制御（move and slide）の
//! 2つの方式を提供します。

pub mod logging;
pub mod models;
pub mod scenario;
pub mod simulation;
