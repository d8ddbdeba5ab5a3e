//! Scalar computation graph with reverse-mode differentiation.
//!
//! Every operation allocates a new [`Value`] whose data is computed eagerly.
//! Nodes are immutable apart from their gradient accumulator, and children are
//! shared handles, so the same node can feed several parents (diamonds) and stay
//! reachable from an [`Environment`](crate::env::Environment) at the same time.

use std::borrow::Cow;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::trace;
use serde::Serialize;

use crate::error::{GraphError, Result};

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(0);

/// Longest operand name inlined into a composed name; longer operands are
/// referred to by node id (`#42`).
const MAX_INLINE_NAME: usize = 64;

/// Process-wide unique node identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a node's data was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Op {
    /// Input or literal
    Leaf,
    /// Literal bound directly to an identifier (`a = 1`)
    Bind,
    Add,
    Sub,
    Mul,
    Div,
    Tanh,
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Leaf => "",
            Op::Bind => "=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Tanh => "tanh",
        }
    }

    /// The binary arithmetic operation written as `symbol`, if any.
    pub fn from_symbol(symbol: &str) -> Option<Op> {
        match symbol {
            "+" => Some(Op::Add),
            "-" => Some(Op::Sub),
            "*" => Some(Op::Mul),
            "/" => Some(Op::Div),
            _ => None,
        }
    }

    /// Binding strength when printed infix; higher binds tighter.
    fn precedence(&self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
            Op::Leaf | Op::Bind | Op::Tanh => 3,
        }
    }

    /// Number of children a node with this op has.
    pub fn arity(&self) -> usize {
        match self {
            Op::Leaf | Op::Bind => 0,
            Op::Tanh => 1,
            Op::Add | Op::Sub | Op::Mul | Op::Div => 2,
        }
    }

    fn eval_binary(&self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
            Op::Leaf | Op::Bind | Op::Tanh => unreachable!("not a binary op: {:?}", self),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

struct Node {
    id: NodeId,
    name: String,
    data: f64,
    op: Op,
    children: Vec<Value>,
    grad: Cell<f64>,
}

// Iterative teardown so long chains don't overflow the stack on drop.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let Ok(mut node) = Rc::try_unwrap(child.0) {
                pending.append(&mut node.children);
            }
        }
    }
}

/// Shared handle to a graph node. Cloning is cheap and keeps identity.
#[derive(Clone)]
pub struct Value(Rc<Node>);

impl Value {
    fn with_children(name: String, data: f64, op: Op, children: Vec<Value>) -> Self {
        Value(Rc::new(Node {
            id: NodeId::fresh(),
            name,
            data,
            op,
            children,
            grad: Cell::new(0.0),
        }))
    }

    /// A leaf with no provenance (network parameters, inputs, literal operands).
    pub fn leaf(name: impl Into<String>, data: f64) -> Self {
        Value::with_children(name.into(), data, Op::Leaf, Vec::new())
    }

    /// A literal bound to an identifier; behaves as a leaf during backward.
    pub fn bound(name: impl Into<String>, data: f64) -> Self {
        Value::with_children(name.into(), data, Op::Bind, Vec::new())
    }

    /// Apply the binary operation `op` to `a` and `b`.
    ///
    /// The result is named `name` when given, otherwise `"{a} {op} {b}"`.
    /// Fails with [`GraphError::UnsupportedOperator`] when `op` is not one of
    /// `+ - * /`.
    pub fn binary(a: &Value, op: Op, b: &Value, name: Option<String>) -> Result<Value> {
        if op.arity() != 2 {
            return Err(GraphError::UnsupportedOperator {
                op: op.symbol().to_string(),
            });
        }
        let data = op.eval_binary(a.data(), b.data());
        let name = name.unwrap_or_else(|| composed_name(a, op, b));
        Ok(Value::with_children(name, data, op, vec![a.clone(), b.clone()]))
    }

    fn binary_unchecked(&self, op: Op, other: &Value) -> Value {
        let data = op.eval_binary(self.data(), other.data());
        let name = composed_name(self, op, other);
        Value::with_children(name, data, op, vec![self.clone(), other.clone()])
    }

    pub fn add(&self, other: &Value) -> Value {
        self.binary_unchecked(Op::Add, other)
    }

    pub fn sub(&self, other: &Value) -> Value {
        self.binary_unchecked(Op::Sub, other)
    }

    pub fn mul(&self, other: &Value) -> Value {
        self.binary_unchecked(Op::Mul, other)
    }

    /// IEEE division: a zero divisor yields an infinity or NaN, never an error.
    pub fn div(&self, other: &Value) -> Value {
        self.binary_unchecked(Op::Div, other)
    }

    pub fn tanh(&self) -> Value {
        Value::with_children(
            format!("tanh({})", self.name()),
            self.data().tanh(),
            Op::Tanh,
            vec![self.clone()],
        )
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn data(&self) -> f64 {
        self.0.data
    }

    pub fn grad(&self) -> f64 {
        self.0.grad.get()
    }

    pub fn op(&self) -> Op {
        self.0.op
    }

    pub fn children(&self) -> &[Value] {
        &self.0.children
    }

    pub fn is_leaf(&self) -> bool {
        self.0.children.is_empty()
    }

    /// True when both handles point at the same node.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// All nodes reachable from `self`, each once, children before parents.
    pub fn topological_order(&self) -> Vec<Value> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<(Value, bool)> = vec![(self.clone(), false)];

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !visited.insert(node.id()) {
                continue;
            }
            stack.push((node.clone(), true));
            // Reversed so the left child is finished first
            for child in node.children().iter().rev() {
                if !visited.contains(&child.id()) {
                    stack.push((child.clone(), false));
                }
            }
        }

        order
    }

    /// Every node reachable from `self`, each once.
    pub fn nodes(&self) -> Vec<Value> {
        self.topological_order()
    }

    /// Reset the gradient of every node reachable from `self` to zero.
    pub fn zero_grad(&self) {
        for node in self.topological_order() {
            node.0.grad.set(0.0);
        }
    }

    /// Reverse-mode pass: fills `grad` of every reachable node with
    /// ∂self/∂node. Gradients from any previous pass are discarded first.
    pub fn backward(&self) {
        let order = self.topological_order();
        for node in &order {
            node.0.grad.set(0.0);
        }
        self.0.grad.set(1.0);

        for node in order.iter().rev() {
            node.propagate();
        }
        trace!("backward from '{}' visited {} nodes", self.name(), order.len());
    }

    fn accumulate(&self, delta: f64) {
        self.0.grad.set(self.0.grad.get() + delta);
    }

    /// Push this node's gradient into its children according to its op.
    fn propagate(&self) {
        let out_grad = self.grad();
        let children = self.children();
        match self.op() {
            Op::Leaf | Op::Bind => {}
            Op::Add => {
                children[0].accumulate(out_grad);
                children[1].accumulate(out_grad);
            }
            Op::Sub => {
                children[0].accumulate(out_grad);
                children[1].accumulate(-out_grad);
            }
            Op::Mul => {
                let (a, b) = (&children[0], &children[1]);
                a.accumulate(b.data() * out_grad);
                b.accumulate(a.data() * out_grad);
            }
            Op::Div => {
                let (a, b) = (&children[0], &children[1]);
                a.accumulate(out_grad / b.data());
                b.accumulate(-out_grad * a.data() / (b.data() * b.data()));
            }
            Op::Tanh => {
                let t = self.data();
                children[0].accumulate((1.0 - t * t) * out_grad);
            }
        }
    }

    /// Verify that no node reachable from `self` is its own ancestor.
    pub fn is_acyclic(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        let mut marks: HashMap<NodeId, Mark> = HashMap::new();
        let mut stack: Vec<(Value, usize)> = vec![(self.clone(), 0)];
        marks.insert(self.id(), Mark::Active);

        while let Some((node, next_child)) = stack.pop() {
            match node.children().get(next_child) {
                Some(child) => {
                    let child = child.clone();
                    stack.push((node, next_child + 1));
                    match marks.get(&child.id()) {
                        Some(Mark::Active) => return false,
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(child.id(), Mark::Active);
                            stack.push((child, 0));
                        }
                    }
                }
                None => {
                    marks.insert(node.id(), Mark::Done);
                }
            }
        }

        true
    }
}

/// `"{a} {op} {b}"`, with an operand parenthesized when it is itself a
/// composed binary name that binds looser than `op`. Operands are
/// left-associative, so a right operand of equal precedence is wrapped too.
fn composed_name(a: &Value, op: Op, b: &Value) -> String {
    format!(
        "{} {} {}",
        operand_name(a, op, false),
        op,
        operand_name(b, op, true)
    )
}

fn operand_name(child: &Value, parent: Op, right: bool) -> Cow<'_, str> {
    let name = child.name();
    if name.len() > MAX_INLINE_NAME {
        return Cow::Owned(format!("#{}", child.id()));
    }
    let composed = child.op().arity() == 2 && name.contains(' ');
    let looser = if right {
        child.op().precedence() <= parent.precedence()
    } else {
        child.op().precedence() < parent.precedence()
    };
    if composed && looser {
        Cow::Owned(format!("({})", name))
    } else {
        Cow::Borrowed(name)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let children: Vec<NodeId> = self.children().iter().map(Value::id).collect();
        f.debug_struct("Value")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("data", &self.data())
            .field("grad", &self.grad())
            .field("op", &self.op())
            .field("children", &children)
            .finish()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {} (grad {})", self.name(), self.data(), self.grad())
    }
}

impl ops::Add for &Value {
    type Output = Value;

    fn add(self, rhs: &Value) -> Value {
        Value::add(self, rhs)
    }
}

impl ops::Sub for &Value {
    type Output = Value;

    fn sub(self, rhs: &Value) -> Value {
        Value::sub(self, rhs)
    }
}

impl ops::Mul for &Value {
    type Output = Value;

    fn mul(self, rhs: &Value) -> Value {
        Value::mul(self, rhs)
    }
}

impl ops::Div for &Value {
    type Output = Value;

    fn div(self, rhs: &Value) -> Value {
        Value::div(self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-10;

    #[test]
    fn test_eager_values_and_names() {
        let a = Value::leaf("a", 2.0);
        let b = Value::leaf("b", -3.0);
        let c = &a * &b;
        assert_eq!(c.data(), -6.0);
        assert_eq!(c.name(), "a * b");
        assert_eq!(c.op(), Op::Mul);
        assert!(c.children()[0].ptr_eq(&a));
        assert!(c.children()[1].ptr_eq(&b));
        assert_eq!(c.tanh().name(), "tanh(a * b)");
    }

    #[test]
    fn test_composed_names_keep_grouping() {
        let a = Value::leaf("a", 1.0);
        let b = Value::leaf("b", 2.0);
        let c = Value::leaf("c", 3.0);

        let grouped = (&a + &b).mul(&c);
        let flat = a.add(&b.mul(&c));
        assert_eq!(grouped.name(), "(a + b) * c");
        assert_eq!(flat.name(), "a + b * c");
        assert_ne!(grouped.name(), flat.name());

        assert_eq!((&(&a - &b) - &c).name(), "a - b - c");
        assert_eq!(a.sub(&(&b - &c)).name(), "a - (b - c)");
        assert_eq!((&a / &(&b * &c)).name(), "a / (b * c)");
        assert_eq!(grouped.tanh().add(&a).name(), "tanh((a + b) * c) + a");
    }

    #[test]
    fn test_named_operands_are_not_wrapped() {
        let a = Value::leaf("a", 1.0);
        let b = Value::leaf("b", 2.0);
        let s = Value::binary(&a, Op::Add, &b, Some("s".to_string())).unwrap();
        assert_eq!(s.mul(&a).name(), "s * a");
    }

    #[test]
    fn test_long_operand_names_refer_to_node_id() {
        let one = Value::leaf("one", 1.0);
        let long = Value::leaf("x".repeat(100), 1.0);
        assert_eq!(long.add(&one).name(), format!("#{} + one", long.id()));

        let mut acc = one.clone();
        for _ in 0..1_000 {
            acc = acc.add(&one);
        }
        assert!(acc.name().len() <= MAX_INLINE_NAME + " + one".len());
    }

    #[test]
    fn test_nodes_lists_each_reachable_node_once() {
        let x = Value::leaf("x", 2.0);
        let y = &(&x * &x) + &x;
        let nodes = y.nodes();
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().any(|n| n.ptr_eq(&x)));
    }

    #[test]
    fn test_binary_rejects_non_arithmetic_op() {
        let a = Value::leaf("a", 1.0);
        let err = Value::binary(&a, Op::Tanh, &a, None).unwrap_err();
        assert_eq!(err, GraphError::UnsupportedOperator { op: "tanh".to_string() });
    }

    #[test]
    fn test_binary_with_explicit_name() {
        let a = Value::leaf("a", 1.0);
        let b = Value::leaf("b", 4.0);
        let c = Value::binary(&a, Op::Div, &b, Some("c".to_string())).unwrap();
        assert_eq!(c.name(), "c");
        assert_eq!(c.data(), 0.25);
    }

    #[test]
    fn test_chain_rule_through_tanh() {
        let a = Value::leaf("a", 1.0);
        let b = Value::leaf("b", 2.0);
        let c = Value::leaf("c", 3.0);
        let t = (&(&a + &b) * &c).tanh();
        t.backward();

        let local = 1.0 - ((1.0f64 + 2.0) * 3.0).tanh().powi(2);
        assert!((a.grad() - 3.0 * local).abs() < EPS);
        assert!((b.grad() - 3.0 * local).abs() < EPS);
        assert!((c.grad() - 3.0 * local).abs() < EPS);
        assert_eq!(t.grad(), 1.0);
    }

    #[test]
    fn test_shared_node_accumulates() {
        let x = Value::leaf("x", 3.0);
        let y = &x * &x;
        y.backward();
        assert!((x.grad() - 6.0).abs() < EPS);
    }

    #[test]
    fn test_diamond_accumulates_across_parents() {
        // f = (x + 1) * (x - 2), df/dx = 2x - 1
        let x = Value::leaf("x", 5.0);
        let one = Value::leaf("1", 1.0);
        let two = Value::leaf("2", 2.0);
        let f = &(&x + &one) * &(&x - &two);
        f.backward();
        assert!((x.grad() - 9.0).abs() < EPS);
        assert!((two.grad() + 6.0).abs() < EPS);
    }

    #[test]
    fn test_division_gradients() {
        let a = Value::leaf("a", 3.0);
        let b = Value::leaf("b", 4.0);
        let q = &a / &b;
        q.backward();
        assert!((a.grad() - 0.25).abs() < EPS);
        assert!((b.grad() + 3.0 / 16.0).abs() < EPS);
    }

    #[test]
    fn test_division_by_zero_propagates_infinity() {
        let a = Value::leaf("a", 1.0);
        let zero = Value::leaf("0", 0.0);
        assert_eq!((&a / &zero).data(), f64::INFINITY);
        let neg = Value::leaf("-1", -1.0);
        assert_eq!((&neg / &zero).data(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_repeated_backward_does_not_double_count() {
        let x = Value::leaf("x", 2.0);
        let y = &x * &x;
        y.backward();
        y.backward();
        assert!((x.grad() - 4.0).abs() < EPS);
    }

    #[test]
    fn test_topological_order_children_first() {
        let a = Value::leaf("a", 1.0);
        let b = Value::leaf("b", 2.0);
        let s = &a + &b;
        let p = &s * &a;
        let order = p.topological_order();
        assert_eq!(order.len(), 4);
        let position = |v: &Value| order.iter().position(|n| n.ptr_eq(v)).unwrap();
        assert!(position(&a) < position(&s));
        assert!(position(&b) < position(&s));
        assert!(position(&s) < position(&p));
        assert!(order.last().unwrap().ptr_eq(&p));
    }

    #[test]
    fn test_bind_behaves_as_leaf() {
        let a = Value::bound("a", 2.0);
        let b = &a + &a;
        b.backward();
        assert_eq!(a.op(), Op::Bind);
        assert!(a.is_leaf());
        assert!((a.grad() - 2.0).abs() < EPS);
    }

    #[test]
    fn test_deep_chain() {
        let one = Value::leaf("1", 1.0);
        let mut acc = Value::leaf("x", 0.0);
        for _ in 0..20_000 {
            acc = Value::binary(&acc, Op::Add, &one, Some("acc".to_string())).unwrap();
        }
        assert_eq!(acc.data(), 20_000.0);
        assert!(acc.is_acyclic());
        acc.backward();
        assert_eq!(one.grad(), 20_000.0);
    }

    #[test]
    fn test_node_ids_are_unique() {
        let a = Value::leaf("same", 1.0);
        let b = Value::leaf("same", 1.0);
        assert_ne!(a.id(), b.id());
        assert!(!a.ptr_eq(&b));
        assert!(a.clone().ptr_eq(&a));
    }
}
