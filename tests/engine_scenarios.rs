use pn_engine::config::{EngineConfig, SelectionMode};
use pn_engine::net::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

struct Chain {
    net: Net,
    token: TokenId,
    p1: PlaceId,
    p2: PlaceId,
    t1: TransitionId,
}

fn chain(infinite_server: bool) -> Chain {
    let mut net = Net::empty();
    let token = net.add_token(Token::new(DEFAULT_TOKEN)).unwrap();
    let p1 = net.add_place(Place::new("P1")).unwrap();
    let p2 = net.add_place(Place::new("P2")).unwrap();
    let t1 = net
        .add_transition(Transition::new("T1").with_infinite_server(infinite_server))
        .unwrap();
    net.add_arc(Arc::input(p1, t1).with_weight(token, "2")).unwrap();
    net.add_arc(Arc::output(t1, p2).with_weight(token, "1")).unwrap();
    net.set_token_count(p1, token, 5).unwrap();
    net.mark_enabled_transitions().unwrap();
    Chain {
        net,
        token,
        p1,
        p2,
        t1,
    }
}

#[test]
fn chain_fires_forward_and_restores_backward() {
    let Chain {
        mut net,
        token,
        p1,
        p2,
        t1,
    } = chain(false);
    assert!(net.is_enabled(t1).unwrap());

    assert_eq!(net.fire_transition(t1).unwrap(), FireOutcome::Fired);
    assert_eq!(net.token_count(p1, token), 3);
    assert_eq!(net.token_count(p2, token), 1);

    net.fire_transition_backwards(t1).unwrap();
    assert_eq!(net.token_count(p1, token), 5);
    assert_eq!(net.token_count(p2, token), 0);
}

#[test]
fn infinite_server_chain_round_trips() {
    let Chain {
        mut net,
        token,
        p1,
        p2,
        t1,
    } = chain(true);

    net.fire_transition(t1).unwrap();
    assert_eq!(net.token_count(p1, token), 1);
    assert_eq!(net.token_count(p2, token), 1);

    net.fire_transition_backwards(t1).unwrap();
    assert_eq!(net.token_count(p1, token), 5);
    assert_eq!(net.token_count(p2, token), 0);
}

#[test]
fn infinite_server_weight_scales_with_degree() {
    let Chain {
        net, token, p1, t1, ..
    } = chain(true);
    assert_eq!(net.enabling_degree(t1).unwrap(), 2);
    assert_eq!(net.backwards_incidence_matrix(token).unwrap().get(p1, t1), 4);
}

#[test]
fn highest_priority_immediate_transition_wins() {
    let mut net = Net::empty();
    let token = net.add_token(Token::new(DEFAULT_TOKEN)).unwrap();
    let source = net.add_place(Place::new("Source")).unwrap();
    net.set_token_count(source, token, 3).unwrap();
    let t1 = net.add_transition(Transition::new("T1").with_priority(5)).unwrap();
    let t2 = net.add_transition(Transition::new("T2").with_priority(3)).unwrap();
    let t3 = net.add_transition(Transition::timed("T3")).unwrap();
    for t in [t1, t2, t3] {
        net.add_arc(Arc::input(source, t).with_weight(token, "1")).unwrap();
    }

    assert_eq!(net.enabled_transitions().unwrap(), vec![t1]);
}

#[test]
fn inhibitor_blocks_even_when_inputs_are_satisfied() {
    let Chain {
        mut net,
        token,
        p1,
        p2,
        t1,
    } = chain(false);
    net.add_arc(Arc::inhibitor(p2, t1).with_weight(token, "1")).unwrap();
    net.mark_enabled_transitions().unwrap();

    assert_eq!(net.fire_transition(t1).unwrap(), FireOutcome::Fired);
    assert_eq!(net.token_count(p1, token), 3);
    assert!(net.enabled_transitions().unwrap().is_empty());
    assert_eq!(net.fire_transition(t1).unwrap(), FireOutcome::Skipped);
    assert_eq!(net.token_count(p1, token), 3);
}

/// Two colours cycling between places, with a capacity bound on `Busy`.
fn cycle() -> (Net, Vec<TokenId>) {
    let document: NetDocument = io::from_json_str(
        r##"{
            "name": "cycle",
            "tokens": ["Default", "Red"],
            "places": [
                { "name": "Idle", "tokens": { "Default": 3, "Red": 2 } },
                { "name": "Busy", "capacity": 2 },
                { "name": "Done" }
            ],
            "transitions": [
                { "name": "Start", "priority": 2 },
                { "name": "StartRed" },
                { "name": "Finish", "timed": true },
                { "name": "Reset", "timed": true }
            ],
            "arcs": [
                { "source": "Idle", "target": "Start", "weights": { "Default": "1" } },
                { "source": "Start", "target": "Busy", "weights": { "Default": "1" } },
                { "source": "Idle", "target": "StartRed", "weights": { "Red": "1" } },
                { "source": "StartRed", "target": "Busy", "weights": { "Red": "1" } },
                { "source": "Busy", "target": "Finish", "weights": { "Default": "1" } },
                { "source": "Finish", "target": "Done", "weights": { "Default": "1" } },
                { "source": "Done", "target": "Reset", "weights": { "Default": "#(Done)" } },
                { "source": "Reset", "target": "Idle", "weights": { "Default": "#(Done)" } }
            ]
        }"##,
    )
    .unwrap();
    let net = document.build(EngineConfig::default()).unwrap();
    let tokens = net.tokens().ids().collect();
    (net, tokens)
}

fn totals(net: &Net, tokens: &[TokenId]) -> Vec<Weight> {
    tokens
        .iter()
        .map(|token| net.places().ids().map(|place| net.token_count(place, *token)).sum())
        .collect()
}

#[test]
fn random_runs_conserve_tokens_and_respect_capacity() {
    for seed in 0..8 {
        let (mut net, tokens) = cycle();
        let busy = net.place_by_name("Busy").unwrap();
        let expected = totals(&net, &tokens);
        let mut rng = StdRng::seed_from_u64(seed);

        for _ in 0..200 {
            match net.fire_random_transition(&mut rng) {
                Ok(_) => {}
                Err(FireError::NoEnabledTransitions) => break,
                Err(err) => panic!("unexpected firing error: {err}"),
            }
            assert_eq!(totals(&net, &tokens), expected);
            assert!(net.marking().total(busy) <= 2);
        }
    }
}

#[test]
fn every_committed_firing_can_be_undone() {
    let (mut net, _) = cycle();
    let events = net.subscribe();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..50 {
        let before = MarkingReport::from_net(&net);
        let transition = net.fire_random_transition(&mut rng).unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event.transition, transition);
        assert_eq!(event.direction, FiringDirection::Forward);

        net.fire_transition_backwards(transition).unwrap();
        assert_eq!(MarkingReport::from_net(&net), before);
        assert_eq!(events.try_recv().unwrap().direction, FiringDirection::Backward);
        assert_eq!(net.fire_transition(transition).unwrap(), FireOutcome::Fired);
        events.try_recv().unwrap();
    }
}

#[test]
fn legacy_selection_never_picks_the_last_candidate() {
    let mut net = Net::new(EngineConfig {
        selection: SelectionMode::Legacy,
        ..EngineConfig::default()
    });
    let token = net.add_token(Token::new(DEFAULT_TOKEN)).unwrap();
    let source = net.add_place(Place::new("Source")).unwrap();
    net.set_token_count(source, token, 1).unwrap();
    let mut ids = Vec::new();
    for name in ["A", "B", "C"] {
        let t = net.add_transition(Transition::new(name)).unwrap();
        net.add_arc(Arc::input(source, t).with_weight(token, "1")).unwrap();
        ids.push(t);
    }

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        assert_ne!(net.random_transition(&mut rng).unwrap(), ids[2]);
    }
}
