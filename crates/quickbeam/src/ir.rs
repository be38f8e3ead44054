//! Bound intermediate representation
//!
//! The binder (outside this crate) resolves names and infers types, then
//! hands the evaluator a tree of [`IrNode`]s. Every node carries an
//! [`IrContext`] with its statically inferred result type and its source
//! span. Arguments a function wants to evaluate lazily are wrapped in
//! [`IrKind::Lambda`].

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::value::{FormulaType, FormulaValue, RecordType};

/// Byte range in the formula source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Start offset
    pub start: usize,
    /// End offset, exclusive
    pub end: usize,
}

impl Span {
    /// New span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Static information attached to every node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IrContext {
    /// Inferred result type
    pub result_type: FormulaType,
    /// Source location
    pub span: Option<Span>,
}

impl IrContext {
    /// Context with a result type and no span.
    pub fn new(result_type: FormulaType) -> Self {
        Self {
            result_type,
            span: None,
        }
    }

    /// Same span, different result type.
    pub fn with_type(&self, result_type: FormulaType) -> Self {
        Self {
            result_type,
            span: self.span,
        }
    }
}

/// How a name reference is resolved at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    /// Nearest non-aliased row scope declaring the name, then globals
    Ambient,
    /// Globals only, skipping row scopes
    Global,
    /// Field of the nearest row scope, ignoring outer scopes
    ThisRow,
    /// Field of the row scope pushed under this alias
    Alias(Arc<str>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
    /// `&`
    Concat,
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Negate,
    /// `x%`
    Percent,
    /// `!x`
    Not,
}

/// Implicit conversions the binder inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Any scalar to text
    ToText,
    /// Text, boolean, date or decimal to number
    ToNumber,
    /// Number or text to decimal
    ToDecimal,
    /// Number or text to boolean
    ToBoolean,
    /// Number to date
    ToDate,
    /// Number or date to date-time
    ToDateTime,
}

/// Node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum IrKind {
    /// Constant
    Literal(FormulaValue),
    /// Reference to a global symbol or a row-scope field
    Name {
        /// Referenced name
        name: Arc<str>,
        /// Resolution strategy
        qualifier: Qualifier,
    },
    /// `source.field`
    Field {
        /// Record, table or untyped object
        source: Box<IrNode>,
        /// Field name
        field: Arc<str>,
    },
    /// Record literal
    Record(Vec<(Arc<str>, IrNode)>),
    /// Single-column table literal `[a, b, c]`
    Table(Vec<IrNode>),
    /// Call into the function registry
    Call {
        /// Registry key, tabular overloads included
        function: Arc<str>,
        /// Arguments, lazy ones wrapped in [`IrKind::Lambda`]
        args: Vec<IrNode>,
    },
    /// Call of a user-defined function
    UdfCall {
        /// Function name
        name: Arc<str>,
        /// Arguments, evaluated eagerly
        args: Vec<IrNode>,
    },
    /// Lazily evaluated argument
    Lambda {
        /// Deferred expression
        body: Arc<IrNode>,
        /// Row type this lambda is evaluated against, if any
        row_type: Option<RecordType>,
        /// Alias of the row scope (`As` name)
        alias: Option<Arc<str>>,
    },
    /// Binary operator
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<IrNode>,
        /// Right operand
        right: Box<IrNode>,
    },
    /// Unary operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<IrNode>,
    },
    /// Implicit conversion
    Coerce {
        /// Target
        to: Coercion,
        /// Value to convert
        operand: Box<IrNode>,
    },
    /// `a; b; c`, yields the last value
    Chain(Vec<IrNode>),
    /// `Set(name, value)`
    Set {
        /// Variable to assign
        name: Arc<str>,
        /// New value
        value: Box<IrNode>,
    },
}

/// A node of the bound tree.
#[derive(Debug, Clone, PartialEq)]
pub struct IrNode {
    /// Payload
    pub kind: IrKind,
    /// Static information
    pub ctx: IrContext,
}

// ═══════════════════════════════════════════════════════════════════
// Constructors
// ═══════════════════════════════════════════════════════════════════

impl IrNode {
    /// Node with an explicit context.
    pub fn new(kind: IrKind, ctx: IrContext) -> Self {
        Self { kind, ctx }
    }

    /// Literal; the type comes from the value.
    pub fn literal(value: impl Into<FormulaValue>) -> Self {
        let value = value.into();
        let ty = value.formula_type();
        Self::new(IrKind::Literal(value), IrContext::new(ty))
    }

    /// Numeric literal.
    pub fn number(n: f64) -> Self {
        Self::literal(FormulaValue::Number(n))
    }

    /// Text literal.
    pub fn text(s: &str) -> Self {
        Self::literal(FormulaValue::string(s))
    }

    /// `Blank()` literal of the given type.
    pub fn blank(ty: FormulaType) -> Self {
        Self::new(IrKind::Literal(FormulaValue::Blank(ty.clone())), IrContext::new(ty))
    }

    /// Unqualified name.
    pub fn name(name: &str, ty: FormulaType) -> Self {
        Self::qualified(name, Qualifier::Ambient, ty)
    }

    /// Name with an explicit qualifier.
    pub fn qualified(name: &str, qualifier: Qualifier, ty: FormulaType) -> Self {
        Self::new(
            IrKind::Name {
                name: Arc::from(name),
                qualifier,
            },
            IrContext::new(ty),
        )
    }

    /// Function call.
    pub fn call(function: &str, args: Vec<IrNode>, ty: FormulaType) -> Self {
        Self::new(
            IrKind::Call {
                function: Arc::from(function),
                args,
            },
            IrContext::new(ty),
        )
    }

    /// User-defined function call.
    pub fn udf_call(name: &str, args: Vec<IrNode>, ty: FormulaType) -> Self {
        Self::new(
            IrKind::UdfCall {
                name: Arc::from(name),
                args,
            },
            IrContext::new(ty),
        )
    }

    /// Lazy argument without a row scope.
    pub fn lambda(body: IrNode) -> Self {
        let ctx = body.ctx.clone();
        Self::new(
            IrKind::Lambda {
                body: Arc::new(body),
                row_type: None,
                alias: None,
            },
            ctx,
        )
    }

    /// Lazy argument evaluated per row of `row_type`.
    pub fn row_lambda(body: IrNode, row_type: RecordType, alias: Option<&str>) -> Self {
        let ctx = body.ctx.clone();
        Self::new(
            IrKind::Lambda {
                body: Arc::new(body),
                row_type: Some(row_type),
                alias: alias.map(Arc::from),
            },
            ctx,
        )
    }

    /// Binary operator.
    pub fn binary(op: BinaryOp, left: IrNode, right: IrNode, ty: FormulaType) -> Self {
        Self::new(
            IrKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            IrContext::new(ty),
        )
    }

    /// Unary operator.
    pub fn unary(op: UnaryOp, operand: IrNode, ty: FormulaType) -> Self {
        Self::new(
            IrKind::Unary {
                op,
                operand: Box::new(operand),
            },
            IrContext::new(ty),
        )
    }

    /// Implicit conversion.
    pub fn coerce(to: Coercion, operand: IrNode, ty: FormulaType) -> Self {
        Self::new(
            IrKind::Coerce {
                to,
                operand: Box::new(operand),
            },
            IrContext::new(ty),
        )
    }

    /// Field access.
    pub fn field(source: IrNode, field: &str, ty: FormulaType) -> Self {
        Self::new(
            IrKind::Field {
                source: Box::new(source),
                field: Arc::from(field),
            },
            IrContext::new(ty),
        )
    }

    /// Record literal; the type comes from the field nodes.
    pub fn record(fields: Vec<(&str, IrNode)>) -> Self {
        let ty = fields.iter().fold(RecordType::new(), |ty, (name, node)| {
            ty.with_field(*name, node.ctx.result_type.clone())
        });
        Self::new(
            IrKind::Record(fields.into_iter().map(|(n, v)| (Arc::from(n), v)).collect()),
            IrContext::new(FormulaType::Record(ty)),
        )
    }

    /// Single-column table literal.
    pub fn table(items: Vec<IrNode>, element: FormulaType) -> Self {
        Self::new(
            IrKind::Table(items),
            IrContext::new(FormulaType::single_column_table(element)),
        )
    }

    /// Chained expressions.
    pub fn chain(items: Vec<IrNode>) -> Self {
        let ty = items
            .last()
            .map(|n| n.ctx.result_type.clone())
            .unwrap_or(FormulaType::Void);
        Self::new(IrKind::Chain(items), IrContext::new(ty))
    }

    /// `Set(name, value)`.
    pub fn set(name: &str, value: IrNode) -> Self {
        Self::new(
            IrKind::Set {
                name: Arc::from(name),
                value: Box::new(value),
            },
            IrContext::new(FormulaType::Void),
        )
    }

    /// Attach a span.
    pub fn at(mut self, span: Span) -> Self {
        self.ctx.span = Some(span);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════
// Analysis
// ═══════════════════════════════════════════════════════════════════

/// Lookup used by [`IrNode::global_names`] to walk into user-defined
/// function bodies.
pub trait UdfBodies {
    /// Parameter names and body of a user-defined function.
    fn udf_body(&self, name: &str) -> Option<(Vec<Arc<str>>, Arc<IrNode>)>;
}

impl UdfBodies for () {
    fn udf_body(&self, _name: &str) -> Option<(Vec<Arc<str>>, Arc<IrNode>)> {
        None
    }
}

impl IrNode {
    /// Global names this expression reads, in first-use order.
    ///
    /// A name counts as global unless a row lambda around it declares a
    /// field of that name (or it is qualified to a row scope). Bodies of
    /// called user-defined functions are included, with their parameters
    /// treated as row fields.
    pub fn global_names(&self, udfs: &dyn UdfBodies) -> IndexSet<Arc<str>> {
        let mut out = IndexSet::new();
        let mut visited = HashSet::new();
        collect_globals(self, &mut Vec::new(), udfs, &mut visited, &mut out);
        out
    }

    /// Whether evaluating this expression may assign variables.
    pub fn has_side_effects(&self) -> bool {
        let mut found = false;
        self.visit(&mut |node| {
            if matches!(node.kind, IrKind::Set { .. } | IrKind::UdfCall { .. }) {
                found = true;
            }
        });
        found
    }

    /// Pre-order traversal.
    pub fn visit(&self, f: &mut dyn FnMut(&IrNode)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    fn children(&self) -> Vec<&IrNode> {
        match &self.kind {
            IrKind::Literal(_) | IrKind::Name { .. } => vec![],
            IrKind::Field { source, .. } => vec![source.as_ref()],
            IrKind::Record(fields) => fields.iter().map(|(_, n)| n).collect(),
            IrKind::Table(items) | IrKind::Chain(items) => items.iter().collect(),
            IrKind::Call { args, .. } | IrKind::UdfCall { args, .. } => args.iter().collect(),
            IrKind::Lambda { body, .. } => vec![body.as_ref()],
            IrKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            IrKind::Unary { operand, .. } | IrKind::Coerce { operand, .. } => {
                vec![operand.as_ref()]
            }
            IrKind::Set { value, .. } => vec![value.as_ref()],
        }
    }
}

fn collect_globals(
    node: &IrNode,
    row_fields: &mut Vec<Vec<Arc<str>>>,
    udfs: &dyn UdfBodies,
    visited: &mut HashSet<Arc<str>>,
    out: &mut IndexSet<Arc<str>>,
) {
    match &node.kind {
        IrKind::Name { name, qualifier } => {
            let shadowed = row_fields.iter().any(|scope| scope.contains(name));
            let global = match qualifier {
                Qualifier::Global => true,
                Qualifier::Ambient => !shadowed,
                Qualifier::ThisRow | Qualifier::Alias(_) => false,
            };
            if global {
                out.insert(name.clone());
            }
        }
        IrKind::Lambda {
            body,
            row_type,
            alias,
        } => match (row_type, alias) {
            (Some(rt), None) => {
                row_fields.push(rt.iter().map(|(n, _)| n.clone()).collect());
                collect_globals(body, row_fields, udfs, visited, out);
                row_fields.pop();
            }
            _ => collect_globals(body, row_fields, udfs, visited, out),
        },
        IrKind::UdfCall { name, args } => {
            for arg in args {
                collect_globals(arg, row_fields, udfs, visited, out);
            }
            if visited.insert(name.clone()) {
                if let Some((params, body)) = udfs.udf_body(name) {
                    // UDF bodies only see their own parameters
                    let mut scopes = vec![params];
                    collect_globals(&body, &mut scopes, udfs, visited, out);
                }
            }
        }
        _ => {
            for child in node.children() {
                collect_globals(child, row_fields, udfs, visited, out);
            }
        }
    }
}
