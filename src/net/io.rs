//! I/O 支持：以名称描述网的 JSON/RON 文档，以及按名称渲染的标识报告。
use std::fs::File;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::net::core::{Net, NetError};
use crate::net::structure::{
    Arc, ArcDirection, ArcType, Place, Rate, RateParameter, Token, Transition, Weight,
};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("net error: {0}")]
    Net(#[from] NetError),
    #[error("arc {source_node} -> {target} must connect a place and a transition")]
    ArcEndpoints { source_node: String, target: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub rate_parameters: Vec<RateParameterSpec>,
    #[serde(default)]
    pub places: Vec<PlaceSpec>,
    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
    #[serde(default)]
    pub arcs: Vec<ArcSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateParameterSpec {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceSpec {
    pub name: String,
    #[serde(default)]
    pub capacity: Option<Weight>,
    /// 初始标识：令牌名 -> 数量
    #[serde(default)]
    pub tokens: IndexMap<String, Weight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub timed: bool,
    #[serde(default)]
    pub infinite_server: bool,
    /// 内联表达式，或速率参数的名字。
    #[serde(default)]
    pub rate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcSpec {
    pub source: String,
    pub target: String,
    #[serde(default, rename = "type")]
    pub arc_type: ArcType,
    /// 令牌名 -> 权重表达式
    pub weights: IndexMap<String, String>,
}

fn default_priority() -> i32 {
    1
}

impl NetDocument {
    /// 通过带校验的修改接口重放文档，并计算初始使能标记。
    pub fn build(&self, config: EngineConfig) -> Result<Net, IoError> {
        let mut net = Net::new(config);
        net.name = self.name.clone();

        for token in &self.tokens {
            net.add_token(Token::new(token.as_str()))?;
        }
        for place in &self.places {
            let id = net.add_place(Place {
                name: place.name.clone(),
                capacity: place.capacity,
            })?;
            for (token, count) in &place.tokens {
                let token = net.token_by_name(token)?;
                net.set_token_count(id, token, *count)?;
            }
        }
        for parameter in &self.rate_parameters {
            net.add_rate_parameter(RateParameter::new(
                parameter.name.as_str(),
                parameter.expression.as_str(),
            ))?;
        }
        for spec in &self.transitions {
            let rate = match &spec.rate {
                None => Rate::default(),
                Some(rate) => match net.rate_parameter_by_name(rate) {
                    Ok(parameter) => Rate::Parameter(parameter),
                    Err(_) => Rate::Normal(rate.clone()),
                },
            };
            let transition = Transition {
                timed: spec.timed,
                ..Transition::new(spec.name.as_str())
            }
            .with_priority(spec.priority)
            .with_infinite_server(spec.infinite_server)
            .with_rate(rate);
            net.add_transition(transition)?;
        }
        for spec in &self.arcs {
            let arc = self.resolve_arc(&net, spec)?;
            net.add_arc(arc)?;
        }

        net.mark_enabled_transitions().map_err(NetError::from)?;
        log::debug!(
            "built net `{}`: {} places, {} transitions, {} arcs",
            net.name,
            net.places().len(),
            net.transitions().len(),
            net.arcs().len()
        );
        Ok(net)
    }

    fn resolve_arc(&self, net: &Net, spec: &ArcSpec) -> Result<Arc, IoError> {
        let (place, transition, direction) = match (
            net.place_by_name(&spec.source),
            net.transition_by_name(&spec.target),
        ) {
            (Ok(place), Ok(transition)) => (place, transition, ArcDirection::PlaceToTransition),
            _ => match (
                net.transition_by_name(&spec.source),
                net.place_by_name(&spec.target),
            ) {
                (Ok(transition), Ok(place)) => {
                    (place, transition, ArcDirection::TransitionToPlace)
                }
                _ => {
                    return Err(IoError::ArcEndpoints {
                        source_node: spec.source.clone(),
                        target: spec.target.clone(),
                    });
                }
            },
        };
        let mut arc = Arc::new(place, transition, direction, spec.arc_type);
        for (token, expression) in &spec.weights {
            arc.weights
                .insert(net.token_by_name(token)?, expression.clone());
        }
        Ok(arc)
    }
}

/// 按名字展开的标识：库所 -> 令牌 -> 数量。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkingReport(pub IndexMap<String, IndexMap<String, Weight>>);

impl MarkingReport {
    pub fn from_net(net: &Net) -> Self {
        let mut report = IndexMap::new();
        for (place_id, place) in net.places().iter_enumerated() {
            let mut row = IndexMap::new();
            for (token_id, token) in net.tokens().iter_enumerated() {
                row.insert(token.name.clone(), net.token_count(place_id, token_id));
            }
            report.insert(place.name.clone(), row);
        }
        Self(report)
    }
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    from_json_str(&content)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s)?)
}

pub fn read_ron<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    from_ron_str(&content)
}

/// 加载 [`NetDocument`]，`.ron` 文件按 RON 解析，其余按 JSON。
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<NetDocument, IoError> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("ron") => read_ron(path),
        _ => read_json(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = r#"{
        "name": "chain",
        "tokens": ["Default"],
        "places": [
            { "name": "P1", "tokens": { "Default": 5 } },
            { "name": "P2", "capacity": 3 }
        ],
        "transitions": [ { "name": "T1" } ],
        "arcs": [
            { "source": "P1", "target": "T1", "weights": { "Default": "2" } },
            { "source": "T1", "target": "P2", "weights": { "Default": "1" } }
        ]
    }"#;

    #[test]
    fn json_document_builds_an_enabled_net() {
        let document: NetDocument = from_json_str(CHAIN).unwrap();
        let net = document.build(EngineConfig::default()).unwrap();
        let t1 = net.transition_by_name("T1").unwrap();

        assert_eq!(net.name, "chain");
        assert_eq!(net.get_place(net.place_by_name("P2").unwrap()).unwrap().capacity, Some(3));
        assert!(net.get_transition(t1).unwrap().is_enabled());

        let report = MarkingReport::from_net(&net);
        assert_eq!(report.0["P1"]["Default"], 5);
        assert_eq!(report.0["P2"]["Default"], 0);
    }

    #[test]
    fn ron_document_supports_rate_parameters_and_inhibitors() {
        let source = r#"(
            tokens: ["Default"],
            rate_parameters: [(name: "lambda", expression: "2.5")],
            places: [(name: "P0", tokens: {"Default": 1}), (name: "Guard")],
            transitions: [(name: "T0", timed: true, rate: Some("lambda"))],
            arcs: [
                (source: "P0", target: "T0", weights: {"Default": "1"}),
                (source: "Guard", target: "T0", type: inhibitor, weights: {"Default": "1"}),
            ],
        )"#;
        let document: NetDocument = from_ron_str(source).unwrap();
        let net = document.build(EngineConfig::default()).unwrap();
        let t0 = net.transition_by_name("T0").unwrap();

        assert_eq!(net.evaluate_rate(t0).unwrap(), 2.5);
        assert_eq!(net.enabled_transitions().unwrap(), vec![t0]);
    }

    #[test]
    fn arcs_between_two_places_are_rejected() {
        let document: NetDocument = from_json_str(
            r#"{
                "tokens": ["Default"],
                "places": [{ "name": "A" }, { "name": "B" }],
                "arcs": [{ "source": "A", "target": "B", "weights": { "Default": "1" } }]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            document.build(EngineConfig::default()),
            Err(IoError::ArcEndpoints { .. })
        ));
    }

    #[test]
    fn unknown_token_in_initial_marking_is_not_found() {
        let document: NetDocument = from_json_str(
            r#"{ "places": [{ "name": "A", "tokens": { "Red": 1 } }] }"#,
        )
        .unwrap();
        assert!(matches!(
            document.build(EngineConfig::default()),
            Err(IoError::Net(NetError::NotFound { .. }))
        ));
    }
}
