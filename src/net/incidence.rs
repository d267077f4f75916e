//! 按令牌颜色计算的稀疏关联矩阵，每次发射时重新构建，从不持久化。
use std::fmt;

use indexmap::IndexMap;

use crate::net::core::Net;
use crate::net::enabling::UNBOUNDED_DEGREE;
use crate::net::expr::EvaluationError;
use crate::net::ids::{PlaceId, TokenId, TransitionId};
use crate::net::structure::{ArcType, Weight};

#[derive(Clone, Default, PartialEq, Eq)]
pub struct IncidenceMatrix {
    token: Option<TokenId>,
    entries: IndexMap<(PlaceId, TransitionId), Weight>,
}

impl IncidenceMatrix {
    pub fn new(token: TokenId) -> Self {
        Self {
            token: Some(token),
            entries: IndexMap::new(),
        }
    }

    pub fn token(&self) -> Option<TokenId> {
        self.token
    }

    pub fn put(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.entries.insert((place, transition), weight);
    }

    /// 缺失的条目读作 0。
    pub fn get(&self, place: PlaceId, transition: TransitionId) -> Weight {
        self.entries
            .get(&(place, transition))
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, TransitionId, Weight)> + '_ {
        self.entries
            .iter()
            .map(|((place, transition), weight)| (*place, *transition, *weight))
    }
}

impl fmt::Debug for IncidenceMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncidenceMatrix")
            .field("token", &self.token)
            .field("entries", &self.entries)
            .finish()
    }
}

impl Net {
    /// `token` 在普通 库所→迁移 弧上的权重，无限服务迁移按使能度放大。
    pub fn backwards_incidence_matrix(
        &self,
        token: TokenId,
    ) -> Result<IncidenceMatrix, EvaluationError> {
        let mut matrix = IncidenceMatrix::new(token);
        for arc in self.arcs.iter() {
            if !arc.is_input() || arc.arc_type != ArcType::Normal {
                continue;
            }
            let Some(expression) = arc.weight_for(token) else {
                continue;
            };
            let Some(transition) = self.transitions.get(arc.transition) else {
                continue;
            };
            let weight = self.evaluate_weight(expression)?;
            let total = if transition.infinite_server {
                let degree = self.enabling_degree(arc.transition)?;
                if degree == UNBOUNDED_DEGREE {
                    weight
                } else {
                    weight.saturating_mul(degree)
                }
            } else {
                weight
            };
            matrix.put(arc.place, arc.transition, total);
        }
        Ok(matrix)
    }

    /// `token` 在普通 迁移→库所 弧上的单次发射权重。
    pub fn forwards_incidence_matrix(
        &self,
        token: TokenId,
    ) -> Result<IncidenceMatrix, EvaluationError> {
        let mut matrix = IncidenceMatrix::new(token);
        for arc in self.arcs.iter() {
            if !arc.is_output() || arc.arc_type != ArcType::Normal {
                continue;
            }
            let Some(expression) = arc.weight_for(token) else {
                continue;
            };
            matrix.put(arc.place, arc.transition, self.evaluate_weight(expression)?);
        }
        Ok(matrix)
    }
}
