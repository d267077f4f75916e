//! 网的静态结构元素：令牌颜色、库所、迁移、速率参数与弧。
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::net::ids::{PlaceId, RateParameterId, TokenId, TransitionId};

pub type Weight = u64;

/// 每个新载入的网都应携带的默认令牌颜色
pub const DEFAULT_TOKEN: &str = "Default";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Token {
    pub name: String,
}

impl Token {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Place {
    pub name: String,
    /// 所有颜色令牌总数的上界，`None` 表示无界
    pub capacity: Option<Weight>,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
        }
    }

    pub fn with_capacity(name: impl Into<String>, capacity: Weight) -> Self {
        Self {
            name: name.into(),
            capacity: Some(capacity),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Rate {
    /// 内联的函数式表达式
    Normal(String),
    /// 共享的具名速率参数
    Parameter(RateParameterId),
}

impl Default for Rate {
    fn default() -> Self {
        Rate::Normal("1".to_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RateParameter {
    pub name: String,
    pub expression: String,
}

impl RateParameter {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Transition {
    pub name: String,
    /// 仅对瞬时迁移（`timed == false`）有意义
    pub priority: i32,
    pub timed: bool,
    pub infinite_server: bool,
    pub rate: Rate,
    /// 由 `Net::mark_enabled_transitions` 维护的缓存标志
    #[serde(skip)]
    pub(crate) enabled: bool,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 1,
            timed: false,
            infinite_server: false,
            rate: Rate::default(),
            enabled: false,
        }
    }

    pub fn timed(name: impl Into<String>) -> Self {
        Self {
            timed: true,
            ..Self::new(name)
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_infinite_server(mut self, infinite_server: bool) -> Self {
        self.infinite_server = infinite_server;
        self
    }

    pub fn with_rate(mut self, rate: Rate) -> Self {
        self.rate = rate;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("timed", &self.timed)
            .field("infinite_server", &self.infinite_server)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArcDirection {
    PlaceToTransition,
    TransitionToPlace,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ArcType {
    #[default]
    Normal,
    Inhibitor,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Arc {
    pub place: PlaceId,
    pub transition: TransitionId,
    pub direction: ArcDirection,
    pub arc_type: ArcType,
    /// 每种令牌颜色对应的权重表达式
    pub weights: IndexMap<TokenId, String>,
}

impl Arc {
    pub fn new(
        place: PlaceId,
        transition: TransitionId,
        direction: ArcDirection,
        arc_type: ArcType,
    ) -> Self {
        Self {
            place,
            transition,
            direction,
            arc_type,
            weights: IndexMap::new(),
        }
    }

    /// 库所 -> 迁移，普通弧
    pub fn input(place: PlaceId, transition: TransitionId) -> Self {
        Self::new(
            place,
            transition,
            ArcDirection::PlaceToTransition,
            ArcType::Normal,
        )
    }

    /// 迁移 -> 库所，普通弧
    pub fn output(transition: TransitionId, place: PlaceId) -> Self {
        Self::new(
            place,
            transition,
            ArcDirection::TransitionToPlace,
            ArcType::Normal,
        )
    }

    pub fn inhibitor(place: PlaceId, transition: TransitionId) -> Self {
        Self::new(
            place,
            transition,
            ArcDirection::PlaceToTransition,
            ArcType::Inhibitor,
        )
    }

    pub fn with_weight(mut self, token: TokenId, expression: impl Into<String>) -> Self {
        self.weights.insert(token, expression.into());
        self
    }

    pub fn weight_for(&self, token: TokenId) -> Option<&str> {
        self.weights.get(&token).map(String::as_str)
    }

    pub fn is_input(&self) -> bool {
        self.direction == ArcDirection::PlaceToTransition
    }

    pub fn is_output(&self) -> bool {
        self.direction == ArcDirection::TransitionToPlace
    }
}

impl fmt::Debug for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arc")
            .field("place", &self.place)
            .field("transition", &self.transition)
            .field("direction", &self.direction)
            .field("arc_type", &self.arc_type)
            .field("weights", &self.weights)
            .finish()
    }
}
