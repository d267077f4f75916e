//! 网的所有权结构：以标识符索引的组件仓库与直接的类型化增删查操作。
use std::fmt;
use std::sync::mpsc::Sender;

use indexmap::IndexMap;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::net::arena::Arena;
use crate::net::events::FiringEvent;
use crate::net::expr::{
    EvalContext, EvaluationError, FunctionalWeightParser, WeightEvaluator, truncate_weight,
};
use crate::net::ids::{ArcId, PlaceId, RateParameterId, TokenId, TransitionId};
use crate::net::marking::{Marking, TokenChange};
use crate::net::structure::{
    Arc, ArcDirection, ArcType, DEFAULT_TOKEN, Place, Rate, RateParameter, Token, Transition,
    Weight,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Token,
    Place,
    Transition,
    Arc,
    RateParameter,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentKind::Token => "token",
            ComponentKind::Place => "place",
            ComponentKind::Transition => "transition",
            ComponentKind::Arc => "arc",
            ComponentKind::RateParameter => "rate parameter",
        })
    }
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("no {kind} `{name}` exists in the net")]
    NotFound { kind: ComponentKind, name: String },
    #[error("{kind} {id} does not exist")]
    UnknownId { kind: ComponentKind, id: String },
    #[error("a {kind} named `{name}` already exists")]
    Duplicate { kind: ComponentKind, name: String },
    #[error("invalid expression `{expression}`: {source}")]
    Validation {
        expression: String,
        #[source]
        source: EvaluationError,
    },
    #[error("inhibitor arcs must run from a place to a transition")]
    InhibitorOnOutput,
    #[error("an arc {direction:?} between {place:?} and {transition:?} already exists")]
    DuplicateArc {
        place: PlaceId,
        transition: TransitionId,
        direction: ArcDirection,
    },
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

fn unknown(kind: ComponentKind, id: impl fmt::Debug) -> NetError {
    NetError::UnknownId {
        kind,
        id: format!("{id:?}"),
    }
}

pub struct Net {
    pub name: String,
    pub(crate) tokens: Arena<TokenId, Token>,
    pub(crate) places: Arena<PlaceId, Place>,
    pub(crate) transitions: Arena<TransitionId, Transition>,
    pub(crate) arcs: Arena<ArcId, Arc>,
    pub(crate) rate_parameters: Arena<RateParameterId, RateParameter>,
    pub(crate) marking: Marking,
    pub(crate) config: EngineConfig,
    evaluator: Box<dyn WeightEvaluator>,
    pub(crate) subscribers: Vec<Sender<FiringEvent>>,
    /// 每个迁移最近一次正向发射提交的变化，供反向发射原样撤销
    pub(crate) last_fired: IndexMap<TransitionId, Vec<TokenChange>>,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("name", &self.name)
            .field("tokens", &self.tokens)
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("arcs", &self.arcs)
            .field("rate_parameters", &self.rate_parameters)
            .field("marking", &self.marking)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Net {
    fn default() -> Self {
        Self::empty()
    }
}

impl Net {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            name: String::new(),
            tokens: Arena::new(),
            places: Arena::new(),
            transitions: Arena::new(),
            arcs: Arena::new(),
            rate_parameters: Arena::new(),
            marking: Marking::new(),
            config,
            evaluator: Box::new(FunctionalWeightParser),
            subscribers: Vec::new(),
            last_fired: IndexMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(EngineConfig::default())
    }

    /// 替换权重与速率所用的表达式求值器
    pub fn with_evaluator(mut self, evaluator: impl WeightEvaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    pub fn tokens(&self) -> &Arena<TokenId, Token> {
        &self.tokens
    }

    pub fn places(&self) -> &Arena<PlaceId, Place> {
        &self.places
    }

    pub fn transitions(&self) -> &Arena<TransitionId, Transition> {
        &self.transitions
    }

    pub fn arcs(&self) -> &Arena<ArcId, Arc> {
        &self.arcs
    }

    pub fn rate_parameters(&self) -> &Arena<RateParameterId, RateParameter> {
        &self.rate_parameters
    }

    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    pub fn get_place(&self, place: PlaceId) -> Option<&Place> {
        self.places.get(place)
    }

    pub fn get_transition(&self, transition: TransitionId) -> Option<&Transition> {
        self.transitions.get(transition)
    }

    pub fn get_token(&self, token: TokenId) -> Option<&Token> {
        self.tokens.get(token)
    }

    pub fn get_arc(&self, arc: ArcId) -> Option<&Arc> {
        self.arcs.get(arc)
    }

    pub fn token_count(&self, place: PlaceId, token: TokenId) -> Weight {
        self.marking.count(place, token)
    }

    pub fn add_token(&mut self, token: Token) -> Result<TokenId, NetError> {
        if self.tokens.iter().any(|existing| existing.name == token.name) {
            return Err(NetError::Duplicate {
                kind: ComponentKind::Token,
                name: token.name,
            });
        }
        Ok(self.tokens.insert(token))
    }

    pub fn add_place(&mut self, place: Place) -> Result<PlaceId, NetError> {
        if self.places.iter().any(|existing| existing.name == place.name) {
            return Err(NetError::Duplicate {
                kind: ComponentKind::Place,
                name: place.name,
            });
        }
        let id = self.places.insert(place);
        self.marking.insert_place(id);
        Ok(id)
    }

    /// 添加迁移；在下一次 [`Net::mark_enabled_transitions`] 之前保持未使能
    pub fn add_transition(&mut self, mut transition: Transition) -> Result<TransitionId, NetError> {
        if self
            .transitions
            .iter()
            .any(|existing| existing.name == transition.name)
        {
            return Err(NetError::Duplicate {
                kind: ComponentKind::Transition,
                name: transition.name,
            });
        }
        match &transition.rate {
            Rate::Normal(expression) => self.validate_expression(expression)?,
            Rate::Parameter(parameter) => {
                if !self.rate_parameters.contains(*parameter) {
                    return Err(unknown(ComponentKind::RateParameter, parameter));
                }
            }
        }
        transition.enabled = false;
        Ok(self.transitions.insert(transition))
    }

    pub fn add_rate_parameter(
        &mut self,
        parameter: RateParameter,
    ) -> Result<RateParameterId, NetError> {
        if self
            .rate_parameters
            .iter()
            .any(|existing| existing.name == parameter.name)
        {
            return Err(NetError::Duplicate {
                kind: ComponentKind::RateParameter,
                name: parameter.name,
            });
        }
        self.validate_expression(&parameter.expression)?;
        Ok(self.rate_parameters.insert(parameter))
    }

    pub fn add_arc(&mut self, arc: Arc) -> Result<ArcId, NetError> {
        if !self.places.contains(arc.place) {
            return Err(unknown(ComponentKind::Place, arc.place));
        }
        if !self.transitions.contains(arc.transition) {
            return Err(unknown(ComponentKind::Transition, arc.transition));
        }
        if arc.arc_type == ArcType::Inhibitor && arc.direction == ArcDirection::TransitionToPlace {
            return Err(NetError::InhibitorOnOutput);
        }
        if self.arcs.iter().any(|existing| {
            existing.place == arc.place
                && existing.transition == arc.transition
                && existing.direction == arc.direction
        }) {
            return Err(NetError::DuplicateArc {
                place: arc.place,
                transition: arc.transition,
                direction: arc.direction,
            });
        }
        for (token, expression) in &arc.weights {
            if !self.tokens.contains(*token) {
                return Err(unknown(ComponentKind::Token, token));
            }
            self.evaluate_weight(expression)
                .map_err(|source| NetError::Validation {
                    expression: expression.clone(),
                    source,
                })?;
        }
        Ok(self.arcs.insert(arc))
    }

    /// 设置库所中某种令牌的数量，缓存的使能标志保持不变，
    /// 直到下一次 [`Net::mark_enabled_transitions`]
    pub fn set_token_count(
        &mut self,
        place: PlaceId,
        token: TokenId,
        count: Weight,
    ) -> Result<(), NetError> {
        if !self.places.contains(place) {
            return Err(unknown(ComponentKind::Place, place));
        }
        if !self.tokens.contains(token) {
            return Err(unknown(ComponentKind::Token, token));
        }
        self.marking.set(place, token, count);
        Ok(())
    }

    pub fn remove_token(&mut self, token: TokenId) -> Result<Token, NetError> {
        let removed = self
            .tokens
            .remove(token)
            .ok_or_else(|| unknown(ComponentKind::Token, token))?;
        for (_, arc) in self.arcs.iter_enumerated_mut() {
            arc.weights.shift_remove(&token);
        }
        self.marking.remove_token(token);
        self.forget_changes(|change| change.token == token);
        Ok(removed)
    }

    /// 移除库所及所有与之相连的弧
    pub fn remove_place(&mut self, place: PlaceId) -> Result<Place, NetError> {
        let removed = self
            .places
            .remove(place)
            .ok_or_else(|| unknown(ComponentKind::Place, place))?;
        let arcs = self.arcs.retain(|_, arc| arc.place != place);
        log::debug!("removed {:?} and its arcs {:?}", place, arcs);
        self.marking.remove_place(place);
        self.forget_changes(|change| change.place == place);
        Ok(removed)
    }

    /// 移除迁移及所有与之相连的弧
    pub fn remove_transition(&mut self, transition: TransitionId) -> Result<Transition, NetError> {
        let removed = self
            .transitions
            .remove(transition)
            .ok_or_else(|| unknown(ComponentKind::Transition, transition))?;
        let arcs = self.arcs.retain(|_, arc| arc.transition != transition);
        log::debug!("removed {:?} and its arcs {:?}", transition, arcs);
        self.last_fired.shift_remove(&transition);
        Ok(removed)
    }

    pub fn remove_arc(&mut self, arc: ArcId) -> Result<Arc, NetError> {
        self.arcs
            .remove(arc)
            .ok_or_else(|| unknown(ComponentKind::Arc, arc))
    }

    /// 引用该参数的迁移退回为携带参数表达式的普通速率
    pub fn remove_rate_parameter(
        &mut self,
        parameter: RateParameterId,
    ) -> Result<RateParameter, NetError> {
        let removed = self
            .rate_parameters
            .remove(parameter)
            .ok_or_else(|| unknown(ComponentKind::RateParameter, parameter))?;
        for (_, transition) in self.transitions.iter_enumerated_mut() {
            if transition.rate == Rate::Parameter(parameter) {
                transition.rate = Rate::Normal(removed.expression.clone());
            }
        }
        Ok(removed)
    }

    pub fn token_by_name(&self, name: &str) -> Result<TokenId, NetError> {
        self.tokens
            .iter_enumerated()
            .find(|(_, token)| token.name == name)
            .map(|(id, _)| id)
            .ok_or_else(|| NetError::NotFound {
                kind: ComponentKind::Token,
                name: name.to_owned(),
            })
    }

    pub fn place_by_name(&self, name: &str) -> Result<PlaceId, NetError> {
        self.places
            .iter_enumerated()
            .find(|(_, place)| place.name == name)
            .map(|(id, _)| id)
            .ok_or_else(|| NetError::NotFound {
                kind: ComponentKind::Place,
                name: name.to_owned(),
            })
    }

    pub fn transition_by_name(&self, name: &str) -> Result<TransitionId, NetError> {
        self.transitions
            .iter_enumerated()
            .find(|(_, transition)| transition.name == name)
            .map(|(id, _)| id)
            .ok_or_else(|| NetError::NotFound {
                kind: ComponentKind::Transition,
                name: name.to_owned(),
            })
    }

    pub fn rate_parameter_by_name(&self, name: &str) -> Result<RateParameterId, NetError> {
        self.rate_parameters
            .iter_enumerated()
            .find(|(_, parameter)| parameter.name == name)
            .map(|(id, _)| id)
            .ok_or_else(|| NetError::NotFound {
                kind: ComponentKind::RateParameter,
                name: name.to_owned(),
            })
    }

    pub fn contains_default_token(&self) -> bool {
        self.tokens.iter().any(|token| token.name == DEFAULT_TOKEN)
    }

    /// 输入弧: place -> transition
    pub fn inbound_arcs(&self, transition: TransitionId) -> impl Iterator<Item = (ArcId, &Arc)> {
        self.arcs
            .iter_enumerated()
            .filter(move |(_, arc)| arc.transition == transition && arc.is_input())
    }

    /// 输出弧: transition -> place
    pub fn outbound_arcs(&self, transition: TransitionId) -> impl Iterator<Item = (ArcId, &Arc)> {
        self.arcs
            .iter_enumerated()
            .filter(move |(_, arc)| arc.transition == transition && arc.is_output())
    }

    pub fn outbound_arcs_of_place(&self, place: PlaceId) -> impl Iterator<Item = (ArcId, &Arc)> {
        self.arcs
            .iter_enumerated()
            .filter(move |(_, arc)| arc.place == place && arc.is_input())
    }

    pub fn evaluate(&self, expression: &str) -> Result<f64, EvaluationError> {
        self.evaluator.evaluate(expression, self)
    }

    /// 在当前标识上求值并向零截断为权重
    pub fn evaluate_weight(&self, expression: &str) -> Result<Weight, EvaluationError> {
        truncate_weight(self.evaluate(expression)?)
    }

    pub fn valid_functional_expression(&self, expression: &str) -> bool {
        self.evaluate(expression).is_ok()
    }

    pub fn evaluate_rate(&self, transition: TransitionId) -> Result<f64, NetError> {
        let transition = self
            .transitions
            .get(transition)
            .ok_or_else(|| unknown(ComponentKind::Transition, transition))?;
        let expression = match &transition.rate {
            Rate::Normal(expression) => expression,
            Rate::Parameter(parameter) => {
                &self
                    .rate_parameters
                    .get(*parameter)
                    .ok_or_else(|| unknown(ComponentKind::RateParameter, parameter))?
                    .expression
            }
        };
        Ok(self.evaluate(expression)?)
    }

    /// 丢弃触及已移除组件的发射记录
    fn forget_changes(&mut self, touches: impl Fn(&TokenChange) -> bool) {
        self.last_fired
            .retain(|_, changes| !changes.iter().any(|change| touches(change)));
    }

    fn validate_expression(&self, expression: &str) -> Result<(), NetError> {
        self.evaluate(expression)
            .map(|_| ())
            .map_err(|source| NetError::Validation {
                expression: expression.to_owned(),
                source,
            })
    }
}

impl EvalContext for Net {
    fn token_count(&self, place: &str, token: Option<&str>) -> Result<Weight, EvaluationError> {
        let place = self
            .place_by_name(place)
            .map_err(|_| EvaluationError::UnknownPlace(place.to_owned()))?;
        match token {
            None => Ok(self.marking.total(place)),
            Some(token) => {
                let token = self
                    .token_by_name(token)
                    .map_err(|_| EvaluationError::UnknownToken(token.to_owned()))?;
                Ok(self.marking.count(place, token))
            }
        }
    }

    fn capacity(&self, place: &str) -> Result<Option<Weight>, EvaluationError> {
        self.place_by_name(place)
            .map(|id| self.places[id].capacity)
            .map_err(|_| EvaluationError::UnknownPlace(place.to_owned()))
    }

    fn variable(&self, name: &str) -> Result<f64, EvaluationError> {
        let parameter = self
            .rate_parameter_by_name(name)
            .map_err(|_| EvaluationError::UnknownVariable(name.to_owned()))?;
        self.evaluator
            .evaluate(&self.rate_parameters[parameter].expression, self)
    }
}
