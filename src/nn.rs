//! Minimal multi-layer perceptron built from graph nodes.
//!
//! Parameters are leaves owned by their neuron; a forward pass only allocates
//! new nodes, so calling it twice builds two independent graphs over the same
//! parameters.

use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::{GraphError, Result};
use crate::graph::Value;

/// Output of a layer or network: a lone value when the width is one.
#[derive(Debug, Clone)]
pub enum LayerOutput {
    Single(Value),
    Many(Vec<Value>),
}

impl LayerOutput {
    pub fn len(&self) -> usize {
        match self {
            LayerOutput::Single(_) => 1,
            LayerOutput::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            LayerOutput::Single(value) => Some(value),
            LayerOutput::Many(_) => None,
        }
    }

    pub fn into_vec(self) -> Vec<Value> {
        match self {
            LayerOutput::Single(value) => vec![value],
            LayerOutput::Many(values) => values,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Neuron {
    weights: Vec<Value>,
    bias: Value,
}

impl Neuron {
    pub fn new(n_in: usize) -> Self {
        Neuron::with_rng(n_in, "", &mut rand::thread_rng())
    }

    /// Weights and bias drawn uniformly from [-1, 1); leaves are named
    /// `{prefix}w{i}` and `{prefix}b`.
    pub fn with_rng<R: Rng + ?Sized>(n_in: usize, prefix: &str, rng: &mut R) -> Self {
        let init = Uniform::new(-1.0, 1.0);
        let weights = (0..n_in)
            .map(|i| Value::leaf(format!("{}w{}", prefix, i), init.sample(rng)))
            .collect();
        let bias = Value::leaf(format!("{}b", prefix), init.sample(rng));
        Neuron { weights, bias }
    }

    /// Neuron with pinned parameters.
    pub fn from_parameters(weights: Vec<Value>, bias: Value) -> Self {
        Neuron { weights, bias }
    }

    pub fn n_in(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[Value] {
        &self.weights
    }

    pub fn bias(&self) -> &Value {
        &self.bias
    }

    /// `tanh(b + Σ wᵢ·xᵢ)`, accumulated left to right starting from the bias.
    pub fn forward(&self, inputs: &[Value]) -> Result<Value> {
        if inputs.len() != self.n_in() {
            return Err(GraphError::ArityMismatch {
                expected: self.n_in(),
                got: inputs.len(),
            });
        }
        let activation = self
            .weights
            .iter()
            .zip(inputs)
            .fold(self.bias.clone(), |acc, (w, x)| acc.add(&w.mul(x)));
        Ok(activation.tanh())
    }

    /// Weights in index order, then the bias.
    pub fn parameters(&self) -> Vec<Value> {
        let mut params = self.weights.clone();
        params.push(self.bias.clone());
        params
    }

    fn stepped(&self, learning_rate: f64) -> Neuron {
        Neuron {
            weights: self.weights.iter().map(|w| descend(w, learning_rate)).collect(),
            bias: descend(&self.bias, learning_rate),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    neurons: Vec<Neuron>,
}

impl Layer {
    pub fn new(n_in: usize, n_out: usize) -> Result<Self> {
        Layer::with_rng(n_in, n_out, "", &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(
        n_in: usize,
        n_out: usize,
        prefix: &str,
        rng: &mut R,
    ) -> Result<Self> {
        if n_in == 0 || n_out == 0 {
            return Err(GraphError::InvalidLayerWidth);
        }
        let neurons = (0..n_out)
            .map(|j| Neuron::with_rng(n_in, &format!("{}n{}.", prefix, j), rng))
            .collect();
        Ok(Layer { neurons })
    }

    /// Layer from existing neurons, which must share one input width.
    pub fn from_neurons(neurons: Vec<Neuron>) -> Result<Self> {
        let n_in = neurons.first().map(Neuron::n_in).ok_or(GraphError::InvalidLayerWidth)?;
        if n_in == 0 {
            return Err(GraphError::InvalidLayerWidth);
        }
        if let Some(odd) = neurons.iter().find(|n| n.n_in() != n_in) {
            return Err(GraphError::ArityMismatch {
                expected: n_in,
                got: odd.n_in(),
            });
        }
        Ok(Layer { neurons })
    }

    pub fn n_in(&self) -> usize {
        self.neurons[0].n_in()
    }

    pub fn n_out(&self) -> usize {
        self.neurons.len()
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    pub fn forward(&self, inputs: &[Value]) -> Result<LayerOutput> {
        if inputs.len() != self.n_in() {
            return Err(GraphError::ArityMismatch {
                expected: self.n_in(),
                got: inputs.len(),
            });
        }
        let mut outs = self
            .neurons
            .iter()
            .map(|neuron| neuron.forward(inputs))
            .collect::<Result<Vec<_>>>()?;
        if outs.len() == 1 {
            return Ok(LayerOutput::Single(outs.remove(0)));
        }
        Ok(LayerOutput::Many(outs))
    }

    pub fn parameters(&self) -> Vec<Value> {
        self.neurons.iter().flat_map(Neuron::parameters).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    pub fn new(n_in: usize, n_outs: &[usize]) -> Result<Self> {
        Network::with_rng(n_in, n_outs, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(n_in: usize, n_outs: &[usize], rng: &mut R) -> Result<Self> {
        if n_outs.is_empty() {
            return Err(GraphError::EmptyNetwork);
        }
        let mut layers = Vec::with_capacity(n_outs.len());
        let mut width = n_in;
        for (index, &n_out) in n_outs.iter().enumerate() {
            layers.push(Layer::with_rng(width, n_out, &format!("l{}.", index), rng)?);
            width = n_out;
        }
        debug!("network {} -> {:?}", n_in, n_outs);
        Ok(Network { layers })
    }

    /// Network from existing layers; each layer's input width must match the
    /// previous layer's output width.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(GraphError::EmptyNetwork);
        }
        for (index, pair) in layers.windows(2).enumerate() {
            if pair[1].n_in() != pair[0].n_out() {
                return Err(GraphError::LayerMismatch {
                    index: index + 1,
                    expected: pair[1].n_in(),
                    got: pair[0].n_out(),
                });
            }
        }
        Ok(Network { layers })
    }

    pub fn n_in(&self) -> usize {
        self.layers[0].n_in()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Pipe `inputs` through every layer in order.
    pub fn forward(&self, inputs: &[Value]) -> Result<LayerOutput> {
        let mut current = LayerOutput::Many(inputs.to_vec());
        for layer in &self.layers {
            current = layer.forward(&current.into_vec())?;
        }
        Ok(current)
    }

    /// Convenience: wrap plain numbers as input leaves `x0, x1, ...` first.
    pub fn forward_scalars(&self, inputs: &[f64]) -> Result<LayerOutput> {
        self.forward(&input_leaves(inputs))
    }

    /// Every weight and bias, layer by layer, neuron by neuron.
    pub fn parameters(&self) -> Vec<Value> {
        self.layers.iter().flat_map(Layer::parameters).collect()
    }

    /// One gradient-descent step. Returns a network with fresh parameter
    /// leaves `p - learning_rate * ∂p`; graphs built from `self` are untouched.
    pub fn step(&self, learning_rate: f64) -> Network {
        let layers = self
            .layers
            .iter()
            .map(|layer| Layer {
                neurons: layer.neurons.iter().map(|n| n.stepped(learning_rate)).collect(),
            })
            .collect();
        Network { layers }
    }
}

fn descend(param: &Value, learning_rate: f64) -> Value {
    Value::leaf(param.name(), param.data() - learning_rate * param.grad())
}

/// Input leaves named `x0, x1, ...`.
pub fn input_leaves(inputs: &[f64]) -> Vec<Value> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, &x)| Value::leaf(format!("x{}", i), x))
        .collect()
}

/// Sum of squared differences between predictions and targets.
pub fn squared_error(predictions: &[Value], targets: &[f64]) -> Result<Value> {
    if predictions.len() != targets.len() {
        return Err(GraphError::ArityMismatch {
            expected: predictions.len(),
            got: targets.len(),
        });
    }
    let mut terms = predictions.iter().zip(targets).map(|(p, &t)| {
        let diff = p.sub(&Value::leaf(format!("{}", t), t));
        diff.mul(&diff)
    });
    let first = terms.next().ok_or(GraphError::ArityMismatch { expected: 1, got: 0 })?;
    Ok(terms.fold(first, |acc, term| acc.add(&term)))
}
