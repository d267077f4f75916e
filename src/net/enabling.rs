//! 可激发集计算：弧策略判定、使能度、瞬时/时间迁移与优先级过滤。
//!
//! 对迁移集合 `E`（原始可激发集）：
//! 1. 若 `E` 中存在瞬时迁移（`timed == false`），移除所有时间迁移；
//! 2. 令 `maxPriority` 为剩余瞬时迁移的最大优先级（无则为 0）；
//! 3. 移除优先级严格小于 `maxPriority` 的瞬时迁移，时间迁移不受影响。
use crate::config::ZeroWeightDegree;
use crate::net::core::Net;
use crate::net::expr::EvaluationError;
use crate::net::ids::TransitionId;
use crate::net::strategy::ArcStrategy;
use crate::net::structure::{ArcType, Weight};

/// 没有普通输入弧的迁移的使能度。
pub const UNBOUNDED_DEGREE: Weight = Weight::MAX;

impl Net {
    /// 当前标识下 `transition` 可并发发射的次数，不考虑其他迁移。抑制弧不参与计算。
    pub fn enabling_degree(&self, transition: TransitionId) -> Result<Weight, EvaluationError> {
        let mut degree = UNBOUNDED_DEGREE;
        for (_, arc) in self.inbound_arcs(transition) {
            if arc.arc_type != ArcType::Normal {
                continue;
            }
            for (token, expression) in &arc.weights {
                let required = self.evaluate_weight(expression)?;
                if required == 0 {
                    match self.config.zero_weight_degree {
                        ZeroWeightDegree::Disabled => degree = 0,
                        ZeroWeightDegree::Unbounded => {}
                    }
                    continue;
                }
                let current = self.marking.count(arc.place, *token) / required;
                degree = degree.min(current);
            }
        }
        Ok(degree)
    }

    /// `transition` 所有输入、输出弧策略的合取。
    pub fn is_enabled(&self, transition: TransitionId) -> Result<bool, EvaluationError> {
        if !self.transitions.contains(transition) {
            return Ok(false);
        }
        for (_, arc) in self.inbound_arcs(transition) {
            let Some(strategy) = ArcStrategy::for_arc(arc) else {
                continue;
            };
            if !strategy.can_fire(self, arc)? {
                return Ok(false);
            }
        }
        for (_, arc) in self.outbound_arcs(transition) {
            let Some(strategy) = ArcStrategy::for_arc(arc) else {
                continue;
            };
            if !strategy.can_fire(self, arc)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 经过瞬时优先于定时、再按优先级过滤后的使能集合，按标识符升序。
    pub fn enabled_transitions(&self) -> Result<Vec<TransitionId>, EvaluationError> {
        let mut enabled = Vec::new();
        for transition in self.transitions.ids() {
            if self.is_enabled(transition)? {
                enabled.push(transition);
            }
        }

        let has_immediate = enabled
            .iter()
            .any(|transition| !self.transitions[*transition].timed);
        if has_immediate {
            enabled.retain(|transition| !self.transitions[*transition].timed);
        }
        let max_priority = enabled
            .iter()
            .map(|transition| &self.transitions[*transition])
            .filter(|transition| !transition.timed)
            .map(|transition| transition.priority)
            .max()
            .unwrap_or(0);
        enabled.retain(|transition| {
            let transition = &self.transitions[*transition];
            transition.timed || transition.priority >= max_priority
        });

        log::trace!("enabled transitions: {:?}", enabled);
        Ok(enabled)
    }

    /// 重新计算使能集合并刷新每个迁移缓存的标记。
    pub fn mark_enabled_transitions(&mut self) -> Result<(), EvaluationError> {
        let enabled = self.enabled_transitions()?;
        for (id, transition) in self.transitions.iter_enumerated_mut() {
            transition.enabled = enabled.contains(&id);
        }
        Ok(())
    }
}
