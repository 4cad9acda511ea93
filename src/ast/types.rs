//! Abstract Syntax Tree (AST) Types for Bash
//!
//! This module defines the node tree produced by the parser. Every syntactic
//! construct is a `Node` variant carrying one of the `XxxNode` structs below;
//! arithmetic and `[[ ... ]]` expressions have their own closed sum types.

// =============================================================================
// NODE
// =============================================================================

/// Union of every construct the parser can produce
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // Leaves and command structure
    Word(WordNode),
    Command(CommandNode),
    Pipeline(PipelineNode),
    List(ListNode),
    Operator(OperatorNode),
    /// Marker following a command joined with `|&`
    PipeBoth,
    Empty,
    Comment(CommentNode),
    Negation(NegationNode),
    Time(TimeNode),
    Coproc(CoprocNode),

    // Redirections
    Redirect(RedirectNode),
    HereDoc(HereDocNode),

    // Compound commands
    Subshell(SubshellNode),
    BraceGroup(BraceGroupNode),
    If(IfNode),
    While(WhileNode),
    Until(UntilNode),
    For(ForNode),
    ForArith(ForArithNode),
    Select(SelectNode),
    Case(CaseNode),
    CasePattern(CasePatternNode),
    Function(FunctionNode),
    ArithmeticCommand(ArithmeticCommandNode),
    ConditionalExpr(ConditionalExprNode),

    // Expansions embedded in words
    ParamExpansion(ParamExpansionNode),
    ParamLength(ParamLengthNode),
    ParamIndirect(ParamExpansionNode),
    CommandSubstitution(CommandSubstitutionNode),
    ArithmeticExpansion(ArithmeticExpansionNode),
    ArithDeprecated(ArithDeprecatedNode),
    ProcessSubstitution(ProcessSubstitutionNode),
    AnsiCQuote(AnsiCQuoteNode),
    LocaleString(LocaleStringNode),
    Array(ArrayNode),
}

impl Node {
    /// Short tag naming the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Word(_) => "word",
            Node::Command(_) => "command",
            Node::Pipeline(_) => "pipeline",
            Node::List(_) => "list",
            Node::Operator(_) => "operator",
            Node::PipeBoth => "pipe-both",
            Node::Empty => "empty",
            Node::Comment(_) => "comment",
            Node::Negation(_) => "negation",
            Node::Time(_) => "time",
            Node::Coproc(_) => "coproc",
            Node::Redirect(_) => "redirect",
            Node::HereDoc(_) => "heredoc",
            Node::Subshell(_) => "subshell",
            Node::BraceGroup(_) => "brace-group",
            Node::If(_) => "if",
            Node::While(_) => "while",
            Node::Until(_) => "until",
            Node::For(_) => "for",
            Node::ForArith(_) => "for-arith",
            Node::Select(_) => "select",
            Node::Case(_) => "case",
            Node::CasePattern(_) => "pattern",
            Node::Function(_) => "function",
            Node::ArithmeticCommand(_) => "arith-cmd",
            Node::ConditionalExpr(_) => "cond-expr",
            Node::ParamExpansion(_) => "param",
            Node::ParamLength(_) => "param-len",
            Node::ParamIndirect(_) => "param-indirect",
            Node::CommandSubstitution(_) => "cmdsub",
            Node::ArithmeticExpansion(_) => "arith",
            Node::ArithDeprecated(_) => "arith-deprecated",
            Node::ProcessSubstitution(_) => "procsub",
            Node::AnsiCQuote(_) => "ansi-c",
            Node::LocaleString(_) => "locale",
            Node::Array(_) => "array",
        }
    }

    pub fn is_operator(&self, op: &str) -> bool {
        matches!(self, Node::Operator(o) if o.op == op)
    }

    /// Fill every here-document reachable from this node from `bodies`,
    /// indexed by `HereDocNode::id`. Bodies that were never gathered stay empty.
    pub fn resolve_heredocs(&mut self, bodies: &[Option<String>]) {
        match self {
            Node::HereDoc(h) => {
                if let Some(Some(content)) = bodies.get(h.id) {
                    h.content = content.clone();
                    h.complete = true;
                }
            }
            Node::Word(w) => w.resolve_heredocs(bodies),
            Node::Command(c) => {
                for w in &mut c.words {
                    w.resolve_heredocs(bodies);
                }
                resolve_all(&mut c.redirects, bodies);
            }
            Node::Pipeline(p) => resolve_all(&mut p.commands, bodies),
            Node::List(l) => resolve_all(&mut l.parts, bodies),
            Node::Negation(n) => resolve_opt(&mut n.pipeline, bodies),
            Node::Time(t) => resolve_opt(&mut t.pipeline, bodies),
            Node::Coproc(c) => c.command.resolve_heredocs(bodies),
            Node::Redirect(r) => r.target.resolve_heredocs(bodies),
            Node::Subshell(s) => {
                s.body.resolve_heredocs(bodies);
                resolve_all(&mut s.redirects, bodies);
            }
            Node::BraceGroup(b) => {
                b.body.resolve_heredocs(bodies);
                resolve_all(&mut b.redirects, bodies);
            }
            Node::If(i) => {
                i.condition.resolve_heredocs(bodies);
                i.then_body.resolve_heredocs(bodies);
                resolve_opt(&mut i.else_body, bodies);
                resolve_all(&mut i.redirects, bodies);
            }
            Node::While(w) => {
                w.condition.resolve_heredocs(bodies);
                w.body.resolve_heredocs(bodies);
                resolve_all(&mut w.redirects, bodies);
            }
            Node::Until(u) => {
                u.condition.resolve_heredocs(bodies);
                u.body.resolve_heredocs(bodies);
                resolve_all(&mut u.redirects, bodies);
            }
            Node::For(f) => {
                for w in f.words.iter_mut().flatten() {
                    w.resolve_heredocs(bodies);
                }
                f.body.resolve_heredocs(bodies);
                resolve_all(&mut f.redirects, bodies);
            }
            Node::ForArith(f) => {
                f.body.resolve_heredocs(bodies);
                resolve_all(&mut f.redirects, bodies);
            }
            Node::Select(s) => {
                for w in s.words.iter_mut().flatten() {
                    w.resolve_heredocs(bodies);
                }
                s.body.resolve_heredocs(bodies);
                resolve_all(&mut s.redirects, bodies);
            }
            Node::Case(c) => {
                c.word.resolve_heredocs(bodies);
                for p in &mut c.patterns {
                    resolve_opt(&mut p.body, bodies);
                }
                resolve_all(&mut c.redirects, bodies);
            }
            Node::CasePattern(p) => resolve_opt(&mut p.body, bodies),
            Node::Function(f) => f.body.resolve_heredocs(bodies),
            Node::ArithmeticCommand(a) => {
                if let Some(e) = &mut a.expression {
                    e.resolve_heredocs(bodies);
                }
                resolve_all(&mut a.redirects, bodies);
            }
            Node::ConditionalExpr(c) => {
                c.body.resolve_heredocs(bodies);
                resolve_all(&mut c.redirects, bodies);
            }
            Node::CommandSubstitution(c) => c.command.resolve_heredocs(bodies),
            Node::ProcessSubstitution(p) => p.command.resolve_heredocs(bodies),
            Node::ArithmeticExpansion(a) => {
                if let Some(e) = &mut a.expression {
                    e.resolve_heredocs(bodies);
                }
            }
            Node::Array(a) => {
                for w in &mut a.elements {
                    w.resolve_heredocs(bodies);
                }
            }
            Node::Operator(_)
            | Node::PipeBoth
            | Node::Empty
            | Node::Comment(_)
            | Node::ParamExpansion(_)
            | Node::ParamLength(_)
            | Node::ParamIndirect(_)
            | Node::ArithDeprecated(_)
            | Node::AnsiCQuote(_)
            | Node::LocaleString(_) => {}
        }
    }
}

fn resolve_all(nodes: &mut [Node], bodies: &[Option<String>]) {
    for n in nodes {
        n.resolve_heredocs(bodies);
    }
}

fn resolve_opt(node: &mut Option<Box<Node>>, bodies: &[Option<String>]) {
    if let Some(n) = node {
        n.resolve_heredocs(bodies);
    }
}

// =============================================================================
// WORDS
// =============================================================================

/// A shell word: the raw lexeme plus the expansions found while reading it,
/// in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WordNode {
    pub value: String,
    pub parts: Vec<Node>,
}

impl WordNode {
    pub fn new(value: impl Into<String>, parts: Vec<Node>) -> Self {
        Self {
            value: value.into(),
            parts,
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self::new(value, Vec::new())
    }

    fn resolve_heredocs(&mut self, bodies: &[Option<String>]) {
        resolve_all(&mut self.parts, bodies);
    }
}

// =============================================================================
// PIPELINES & COMMANDS
// =============================================================================

/// Simple command: words and redirections in source order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandNode {
    pub words: Vec<WordNode>,
    /// `Redirect` and `HereDoc` nodes
    pub redirects: Vec<Node>,
}

/// cmd1 | cmd2 |& cmd3 (a `PipeBoth` marker follows each `|&` command)
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    pub commands: Vec<Node>,
}

/// Commands alternating with `Operator` nodes
#[derive(Debug, Clone, PartialEq)]
pub struct ListNode {
    pub parts: Vec<Node>,
}

/// List operator: "&&" | "||" | ";" | "&" | "\n"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorNode {
    pub op: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    pub text: String,
}

/// ! pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct NegationNode {
    pub pipeline: Option<Box<Node>>,
}

/// time [-p] pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct TimeNode {
    pub pipeline: Option<Box<Node>>,
    pub posix: bool,
}

/// coproc [NAME] command
#[derive(Debug, Clone, PartialEq)]
pub struct CoprocNode {
    pub command: Box<Node>,
    /// Empty when unnamed (renders as COPROC)
    pub name: String,
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

/// I/O redirection. `op` keeps any fd or `{var}` prefix as written.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectNode {
    pub op: String,
    pub target: WordNode,
    /// Numeric descriptor prefix, if any
    pub fd: Option<i64>,
}

/// Here document. The body is filled in after parsing from the parser's
/// body table, keyed by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct HereDocNode {
    pub id: usize,
    pub delimiter: String,
    pub content: String,
    /// <<- strips leading tabs
    pub strip_tabs: bool,
    pub quoted: bool,
    pub fd: Option<i64>,
    pub complete: bool,
    pub start_pos: usize,
}

// =============================================================================
// COMPOUND COMMANDS
// =============================================================================

/// ( ... )
#[derive(Debug, Clone, PartialEq)]
pub struct SubshellNode {
    pub body: Box<Node>,
    pub redirects: Vec<Node>,
}

/// { ...; }
#[derive(Debug, Clone, PartialEq)]
pub struct BraceGroupNode {
    pub body: Box<Node>,
    pub redirects: Vec<Node>,
}

/// if/elif/else; an elif chain nests as another `If` in `else_body`
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub condition: Box<Node>,
    pub then_body: Box<Node>,
    pub else_body: Option<Box<Node>>,
    pub redirects: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileNode {
    pub condition: Box<Node>,
    pub body: Box<Node>,
    pub redirects: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UntilNode {
    pub condition: Box<Node>,
    pub body: Box<Node>,
    pub redirects: Vec<Node>,
}

/// for VAR [in WORDS]; do ...; done
#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub var: String,
    /// None when there is no `in` clause (iterates "$@")
    pub words: Option<Vec<WordNode>>,
    pub body: Box<Node>,
    pub redirects: Vec<Node>,
}

/// for ((init; cond; incr)); clauses are kept as text
#[derive(Debug, Clone, PartialEq)]
pub struct ForArithNode {
    pub init: String,
    pub cond: String,
    pub incr: String,
    pub body: Box<Node>,
    pub redirects: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectNode {
    pub var: String,
    pub words: Option<Vec<WordNode>>,
    pub body: Box<Node>,
    pub redirects: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseNode {
    pub word: WordNode,
    pub patterns: Vec<CasePatternNode>,
    pub redirects: Vec<Node>,
}

/// One `pattern) body ;;` clause; alternatives stay joined with `|`
#[derive(Debug, Clone, PartialEq)]
pub struct CasePatternNode {
    pub pattern: String,
    pub body: Option<Box<Node>>,
    /// ";;" | ";&" | ";;&"
    pub terminator: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionNode {
    pub name: String,
    pub body: Box<Node>,
}

/// (( expr ))
#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticCommandNode {
    pub expression: Option<ArithExpr>,
    pub redirects: Vec<Node>,
    /// Text between the parentheses, line continuations removed
    pub raw_content: String,
}

/// [[ expr ]]
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExprNode {
    pub body: CondExpr,
    pub redirects: Vec<Node>,
}

// =============================================================================
// EXPANSIONS
// =============================================================================

/// ${param op arg} or $param; also used for ${!param...}
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParamExpansionNode {
    pub param: String,
    pub op: String,
    pub arg: String,
}

impl ParamExpansionNode {
    pub fn new(param: impl Into<String>, op: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            op: op.into(),
            arg: arg.into(),
        }
    }
}

/// ${#param}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamLengthNode {
    pub param: String,
}

/// $( ... ), `...`, or the ${ ...; } / ${| ...; } funsub forms (`brace`)
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSubstitutionNode {
    pub command: Box<Node>,
    pub brace: bool,
}

/// $(( ... ))
#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticExpansionNode {
    pub expression: Option<Box<ArithExpr>>,
}

/// $[ ... ]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArithDeprecatedNode {
    pub expression: String,
}

/// <( ... ) or >( ... )
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSubstitutionNode {
    pub direction: String,
    pub command: Box<Node>,
}

/// $'...' with escapes left undecoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnsiCQuoteNode {
    pub content: String,
}

/// $"..."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleStringNode {
    pub content: String,
}

/// name=( ... ) elements
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    pub elements: Vec<WordNode>,
}

// =============================================================================
// ARITHMETIC EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ArithExpr {
    Number(String),
    /// Missing operand, e.g. `(( ))` or `1 + )`
    Empty,
    Var(String),
    Binary {
        op: String,
        left: Box<ArithExpr>,
        right: Box<ArithExpr>,
    },
    Unary {
        op: String,
        operand: Box<ArithExpr>,
    },
    PreIncr(Box<ArithExpr>),
    PostIncr(Box<ArithExpr>),
    PreDecr(Box<ArithExpr>),
    PostDecr(Box<ArithExpr>),
    Assign {
        op: String,
        target: Box<ArithExpr>,
        value: Box<ArithExpr>,
    },
    Ternary {
        condition: Box<ArithExpr>,
        if_true: Option<Box<ArithExpr>>,
        if_false: Option<Box<ArithExpr>>,
    },
    Comma {
        left: Box<ArithExpr>,
        right: Box<ArithExpr>,
    },
    Subscript {
        array: String,
        index: Box<ArithExpr>,
    },
    /// Backslash-escaped character
    Escape(String),
    /// Numeral glued to expansions, e.g. `1$x`
    Concat(Vec<ArithExpr>),
    /// `$x`, `${x}`, `$(cmd)`, nested `$((..))` or a backtick command
    Expansion(Box<Node>),
}

impl ArithExpr {
    fn resolve_heredocs(&mut self, bodies: &[Option<String>]) {
        match self {
            ArithExpr::Expansion(n) => n.resolve_heredocs(bodies),
            ArithExpr::Binary { left, right, .. } | ArithExpr::Comma { left, right } => {
                left.resolve_heredocs(bodies);
                right.resolve_heredocs(bodies);
            }
            ArithExpr::Unary { operand, .. }
            | ArithExpr::PreIncr(operand)
            | ArithExpr::PostIncr(operand)
            | ArithExpr::PreDecr(operand)
            | ArithExpr::PostDecr(operand) => operand.resolve_heredocs(bodies),
            ArithExpr::Assign { target, value, .. } => {
                target.resolve_heredocs(bodies);
                value.resolve_heredocs(bodies);
            }
            ArithExpr::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                condition.resolve_heredocs(bodies);
                for branch in [if_true, if_false].into_iter().flatten() {
                    branch.resolve_heredocs(bodies);
                }
            }
            ArithExpr::Subscript { index, .. } => index.resolve_heredocs(bodies),
            ArithExpr::Concat(parts) => {
                for p in parts {
                    p.resolve_heredocs(bodies);
                }
            }
            ArithExpr::Number(_) | ArithExpr::Empty | ArithExpr::Var(_) | ArithExpr::Escape(_) => {}
        }
    }
}

// =============================================================================
// CONDITIONAL EXPRESSIONS
// =============================================================================

/// Body of [[ ... ]]
#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    Unary {
        op: String,
        operand: WordNode,
    },
    Binary {
        op: String,
        left: WordNode,
        right: WordNode,
    },
    And(Box<CondExpr>, Box<CondExpr>),
    Or(Box<CondExpr>, Box<CondExpr>),
    Not(Box<CondExpr>),
    Paren(Box<CondExpr>),
}

impl CondExpr {
    fn resolve_heredocs(&mut self, bodies: &[Option<String>]) {
        match self {
            CondExpr::Unary { operand, .. } => operand.resolve_heredocs(bodies),
            CondExpr::Binary { left, right, .. } => {
                left.resolve_heredocs(bodies);
                right.resolve_heredocs(bodies);
            }
            CondExpr::And(l, r) | CondExpr::Or(l, r) => {
                l.resolve_heredocs(bodies);
                r.resolve_heredocs(bodies);
            }
            CondExpr::Not(inner) | CondExpr::Paren(inner) => inner.resolve_heredocs(bodies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heredoc(id: usize) -> Node {
        Node::HereDoc(HereDocNode {
            id,
            delimiter: "EOF".to_string(),
            content: String::new(),
            strip_tabs: false,
            quoted: false,
            fd: None,
            complete: false,
            start_pos: 0,
        })
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(Node::Empty.kind(), "empty");
        assert_eq!(Node::PipeBoth.kind(), "pipe-both");
        assert_eq!(
            Node::ParamIndirect(ParamExpansionNode::new("x", "", "")).kind(),
            "param-indirect"
        );
        assert!(Node::Operator(OperatorNode { op: ";".into() }).is_operator(";"));
    }

    #[test]
    fn test_resolve_heredocs_reaches_nested_commands() {
        let inner = Node::Command(CommandNode {
            words: vec![WordNode::literal("cat")],
            redirects: vec![heredoc(1)],
        });
        let sub = Node::CommandSubstitution(CommandSubstitutionNode {
            command: Box::new(inner),
            brace: false,
        });
        let mut root = Node::Command(CommandNode {
            words: vec![WordNode::new("$(cat <<EOF)", vec![sub])],
            redirects: vec![heredoc(0)],
        });
        root.resolve_heredocs(&[Some("outer\n".into()), Some("inner\n".into())]);

        let Node::Command(cmd) = &root else {
            panic!("expected command");
        };
        let Node::HereDoc(outer) = &cmd.redirects[0] else {
            panic!("expected heredoc");
        };
        assert_eq!(outer.content, "outer\n");
        assert!(outer.complete);
        let Node::CommandSubstitution(sub) = &cmd.words[0].parts[0] else {
            panic!("expected cmdsub");
        };
        let Node::Command(inner) = sub.command.as_ref() else {
            panic!("expected command");
        };
        let Node::HereDoc(h) = &inner.redirects[0] else {
            panic!("expected heredoc");
        };
        assert_eq!(h.content, "inner\n");
    }

    #[test]
    fn test_resolve_heredocs_leaves_ungathered_empty() {
        let mut node = heredoc(3);
        node.resolve_heredocs(&[None]);
        let Node::HereDoc(h) = node else {
            panic!("expected heredoc");
        };
        assert!(h.content.is_empty());
        assert!(!h.complete);
    }
}
