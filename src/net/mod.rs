//! # 着色 Petri 网标识与发射引擎
//!
//! 网由令牌颜色、库所、迁移、弧与速率参数组成，全部存放在按 id 寻址的
//! 竞技场中。标识 `M` 记录每个库所中每种令牌的计数 `M[p][k] ∈ ℕ`。
//!
//! * 迁移 `t` **可激发**，当且仅当它的每条输入普通弧、抑制弧和输出普通弧的
//!   策略判定都成立；之后再依次应用“瞬时优先于时间迁移”与最大优先级过滤；
//! * 迁移 **发射** 后对每种颜色 `k` 有 `M'[p][k] = M[p][k] - Pre_k[p, t] + Post_k[p, t]`，
//!   其中无限服务迁移的 `Pre_k` 乘以当前使能度；
//! * 弧权重可以是引用标识的函数表达式，如 `#(P0) * 2`，在发射前一次性求值。
//!
//! ## 示例
//!
//! ```rust
//! use pn_engine::net::*;
//!
//! let mut net = Net::empty();
//! let token = net.add_token(Token::new("Default")).unwrap();
//! let p0 = net.add_place(Place::new("P0")).unwrap();
//! let p1 = net.add_place(Place::new("P1")).unwrap();
//! let t0 = net.add_transition(Transition::new("T0")).unwrap();
//! net.add_arc(Arc::input(p0, t0).with_weight(token, "1")).unwrap();
//! net.add_arc(Arc::output(t0, p1).with_weight(token, "1")).unwrap();
//! net.set_token_count(p0, token, 1).unwrap();
//!
//! net.mark_enabled_transitions().unwrap();
//! assert_eq!(net.enabled_transitions().unwrap(), vec![t0]);
//! assert_eq!(net.fire_transition(t0).unwrap(), FireOutcome::Fired);
//! assert_eq!(net.token_count(p0, token), 0);
//! assert_eq!(net.token_count(p1, token), 1);
//! ```

pub mod arena;
pub mod core;
pub mod enabling;
pub mod events;
pub mod expr;
pub mod fire;
pub mod ids;
pub mod incidence;
pub mod io;
pub mod marking;
pub mod strategy;
pub mod structure;

pub use arena::{Arena, Idx};
pub use core::{ComponentKind, Net, NetError};
pub use enabling::UNBOUNDED_DEGREE;
pub use events::{FiringDirection, FiringEvent};
pub use expr::{EvalContext, EvaluationError, FunctionalWeightParser, WeightEvaluator};
pub use fire::{FireError, FireOutcome};
pub use ids::{ArcId, PlaceId, RateParameterId, TokenId, TransitionId};
pub use incidence::IncidenceMatrix;
pub use io::{IoError, MarkingReport, NetDocument};
pub use marking::{Marking, TokenChange};
pub use strategy::ArcStrategy;
pub use structure::{
    Arc, ArcDirection, ArcType, DEFAULT_TOKEN, Place, Rate, RateParameter, Token, Transition,
    Weight,
};
