//! 弧策略层：按（方向, 弧类型）封闭枚举分派的可激发判定。
//!
//! * 输入普通弧：库所中每种被引用的令牌数 ≥ 弧权重；
//! * 抑制弧：库所中每种被引用的令牌数 < 弧权重（权重 1 即“库所必须为空”）；
//! * 输出普通弧：发射后目标库所的令牌总数不超过容量，无容量时恒成立。
//!
//! 输出方向不存在抑制弧策略，这种结构在 `Net::add_arc` 中已被拒绝。
use crate::net::core::Net;
use crate::net::enabling::UNBOUNDED_DEGREE;
use crate::net::expr::EvaluationError;
use crate::net::structure::{Arc, ArcDirection, ArcType, Weight};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcStrategy {
    BackwardsNormal,
    Inhibitor,
    ForwardsNormal,
}

impl ArcStrategy {
    pub fn for_arc(arc: &Arc) -> Option<Self> {
        match (arc.direction, arc.arc_type) {
            (ArcDirection::PlaceToTransition, ArcType::Normal) => Some(ArcStrategy::BackwardsNormal),
            (ArcDirection::PlaceToTransition, ArcType::Inhibitor) => Some(ArcStrategy::Inhibitor),
            (ArcDirection::TransitionToPlace, ArcType::Normal) => Some(ArcStrategy::ForwardsNormal),
            (ArcDirection::TransitionToPlace, ArcType::Inhibitor) => None,
        }
    }

    /// 在当前标识下 `arc` 是否允许其迁移发射。
    pub fn can_fire(self, net: &Net, arc: &Arc) -> Result<bool, EvaluationError> {
        let marking = net.marking();
        let verdict = match self {
            ArcStrategy::BackwardsNormal => {
                let mut enabled = true;
                for (token, expression) in &arc.weights {
                    let required = net.evaluate_weight(expression)?;
                    if marking.count(arc.place, *token) < required {
                        enabled = false;
                        break;
                    }
                }
                enabled
            }
            ArcStrategy::Inhibitor => {
                let mut enabled = true;
                for (token, expression) in &arc.weights {
                    let threshold = net.evaluate_weight(expression)?;
                    if marking.count(arc.place, *token) >= threshold {
                        enabled = false;
                        break;
                    }
                }
                enabled
            }
            ArcStrategy::ForwardsNormal => {
                let Some(capacity) = net.get_place(arc.place).and_then(|place| place.capacity)
                else {
                    return Ok(true);
                };
                let produced = arc_total(net, arc)?;
                // 同一次发射从该库所取走的令牌（自环）先行扣除，无限服务迁移按使能度放大
                let mut consumed: Weight = 0;
                for (_, input) in net.inbound_arcs(arc.transition) {
                    if input.place == arc.place && input.arc_type == ArcType::Normal {
                        consumed = consumed.saturating_add(arc_total(net, input)?);
                    }
                }
                if consumed > 0 && net.get_transition(arc.transition).is_some_and(|t| t.infinite_server) {
                    let degree = net.enabling_degree(arc.transition)?;
                    if degree != UNBOUNDED_DEGREE {
                        consumed = consumed.saturating_mul(degree);
                    }
                }
                let after = marking
                    .total(arc.place)
                    .saturating_sub(consumed)
                    .saturating_add(produced);
                after <= capacity
            }
        };
        log::trace!(
            "{:?} on {:?}/{:?}: {}",
            self,
            arc.place,
            arc.transition,
            verdict
        );
        Ok(verdict)
    }
}

fn arc_total(net: &Net, arc: &Arc) -> Result<Weight, EvaluationError> {
    let mut total: Weight = 0;
    for expression in arc.weights.values() {
        total = total.saturating_add(net.evaluate_weight(expression)?);
    }
    Ok(total)
}
