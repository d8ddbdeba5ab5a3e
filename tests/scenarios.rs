use approx::assert_relative_eq;
use micrograph::{
    compile_source, input_leaves, squared_error, Analyzer, AnalyzerConfig, GraphData, GraphError,
    Network, Op, Value,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn product_of_sum_backpropagates() {
    let out = compile_source("a = 2; b = -3; c = 10; e = a * b; d = e + c").unwrap();
    let d = out.result.unwrap();
    assert_eq!(d.name(), "d");
    assert_eq!(d.data(), 4.0);

    d.backward();
    let env = &out.environment;
    assert_eq!(env.lookup("e").unwrap().grad(), 1.0);
    assert_eq!(env.lookup("c").unwrap().grad(), 1.0);
    assert_eq!(env.lookup("a").unwrap().grad(), -3.0);
    assert_eq!(env.lookup("b").unwrap().grad(), 2.0);
}

#[test]
fn tanh_neuron_gradients() {
    let x1 = Value::leaf("x1", 2.0);
    let x2 = Value::leaf("x2", 0.0);
    let w1 = Value::leaf("w1", -3.0);
    let w2 = Value::leaf("w2", 1.0);
    let b = Value::leaf("b", 6.881_373_587_019_543);
    let n = &(&(&x1 * &w1) + &(&x2 * &w2)) + &b;
    let o = n.tanh();
    assert_relative_eq!(o.data(), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);

    o.backward();
    assert_relative_eq!(n.grad(), 0.5, epsilon = 1e-9);
    assert_relative_eq!(x1.grad(), -1.5, epsilon = 1e-9);
    assert_relative_eq!(w1.grad(), 1.0, epsilon = 1e-9);
    assert_relative_eq!(x2.grad(), 0.5, epsilon = 1e-9);
    assert_relative_eq!(w2.grad(), 0.0, epsilon = 1e-9);
}

#[test]
fn shared_operand_accumulates() {
    let a = Value::leaf("a", 3.0);
    let b = a.add(&a);
    b.backward();
    assert_eq!(a.grad(), 2.0);

    // A second pass starts from fresh gradients.
    b.backward();
    assert_eq!(a.grad(), 2.0);
}

#[test]
fn failed_compilation_leaves_nothing_behind() {
    match compile_source("a = 1; b = a + z") {
        Err(GraphError::UnresolvedIdentifier { name }) => assert_eq!(name, "z"),
        other => panic!("unexpected: {:?}", other),
    }
    let err = compile_source("a = 5 % 2").unwrap_err();
    assert_eq!(err.to_string(), "Unsupported operation: %");
}

#[test]
fn identifier_binding_aliases_node() {
    let out = compile_source("a = 4; b = a").unwrap();
    let a = out.environment.lookup("a").unwrap();
    let b = out.environment.lookup("b").unwrap();
    assert!(a.ptr_eq(&b));
    assert_eq!(a.op(), Op::Bind);
}

#[test]
fn network_training_reduces_loss() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut net = Network::with_rng(3, &[4, 4, 1], &mut rng).unwrap();
    let xs = [
        [2.0, 3.0, -1.0],
        [3.0, -1.0, 0.5],
        [0.5, 1.0, 1.0],
        [1.0, 1.0, -1.0],
    ];
    let ys = [1.0, -1.0, -1.0, 1.0];

    let loss_of = |net: &Network| {
        let preds: Vec<Value> = xs
            .iter()
            .map(|x| {
                let out = net.forward(&input_leaves(x)).unwrap();
                out.as_single().cloned().unwrap()
            })
            .collect();
        squared_error(&preds, &ys).unwrap()
    };

    let initial = loss_of(&net).data();
    let mut last = initial;
    for _ in 0..30 {
        let loss = loss_of(&net);
        loss.backward();
        last = loss.data();
        net = net.step(0.05);
    }
    assert!(last < initial, "loss {} did not drop below {}", last, initial);
}

#[test]
fn same_seed_builds_same_network() {
    let a = Network::with_rng(2, &[3, 1], &mut StdRng::seed_from_u64(42)).unwrap();
    let b = Network::with_rng(2, &[3, 1], &mut StdRng::seed_from_u64(42)).unwrap();
    let pa: Vec<f64> = a.parameters().iter().map(Value::data).collect();
    let pb: Vec<f64> = b.parameters().iter().map(Value::data).collect();
    assert_eq!(pa, pb);
    assert!(pa.iter().all(|w| (-1.0..=1.0).contains(w)));
}

#[test]
fn analyzer_exports_graph_after_backward() {
    let mut analyzer = Analyzer::new(AnalyzerConfig::default().with_auto_backward(true));
    analyzer.analyze("x = 3; y = x * x").unwrap();
    let data = analyzer.graph_data().unwrap();
    let x = data.nodes.iter().find(|n| n.name == "x").unwrap();
    assert_eq!(x.grad, 6.0);
    assert_eq!(data.links.len(), 2);

    assert!(analyzer.analyze("y = q").is_err());
    assert!(analyzer.result().is_none());
}

#[test]
fn graph_data_serializes_to_json() {
    let out = compile_source("a = 1; b = 2; c = a + b").unwrap();
    let data = GraphData::from_root(out.result.as_ref().unwrap());
    let json: serde_json::Value = serde_json::from_str(&data.to_json().unwrap()).unwrap();
    assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(json["links"].as_array().unwrap().len(), 2);
}
