//! Lowering grammar expressions to flat productions.
//!
//! Symbol ids are assigned in table order: the two reserved symbols, the
//! token rules, the external tokens, the anonymous tokens in order of first
//! use, the nonterminal rules, then the helper rules created for repeats.

use super::{Expr, GrammarBuilder};
use crate::error::GrammarError;
use crate::language::{Associativity, Symbol, SymbolInfo, TokenDef, TokenPattern};
use compact_str::CompactString;
use hashbrown::{HashMap, HashSet};
use lasso::{Rodeo, Spur};
use std::collections::BTreeSet;

/// Upper bound on the alternatives one rule may expand into.
const MAX_ALTERNATIVES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FlatProduction {
    pub(crate) lhs: Symbol,
    pub(crate) rhs: Vec<Symbol>,
    pub(crate) precedence: i32,
    pub(crate) associativity: Associativity,
    pub(crate) dynamic_precedence: i32,
}

/// A grammar reduced to symbols and productions.
#[derive(Debug, Clone)]
pub(crate) struct Grammar {
    pub(crate) name: String,
    pub(crate) symbols: Vec<SymbolInfo>,
    pub(crate) tokens: Vec<TokenDef>,
    pub(crate) productions: Vec<FlatProduction>,
    pub(crate) start: Symbol,
    pub(crate) extras: Vec<Symbol>,
    pub(crate) word: Option<Symbol>,
    pub(crate) externals: Vec<Symbol>,
    pub(crate) conflicts: Vec<BTreeSet<Symbol>>,
    /// Per symbol, the rule it was written in. Helper rules map to the rule
    /// that contains the repeat.
    pub(crate) origin: Vec<Symbol>,
}

impl Grammar {
    pub(crate) fn is_terminal(&self, symbol: Symbol) -> bool {
        self.symbols
            .get(symbol.index())
            .is_some_and(|info| info.terminal)
    }

    pub(crate) fn name_of(&self, symbol: Symbol) -> &str {
        self.symbols
            .get(symbol.index())
            .map_or("", |info| info.name.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct Alternative {
    symbols: Vec<Symbol>,
    precedence: Option<i32>,
    associativity: Option<Associativity>,
    dynamic_precedence: Option<i32>,
}

impl Alternative {
    fn single(symbol: Symbol) -> Self {
        Self {
            symbols: vec![symbol],
            ..Self::default()
        }
    }

    fn concat(&self, next: &Self) -> Self {
        let mut symbols = self.symbols.clone();
        symbols.extend_from_slice(&next.symbols);
        Self {
            symbols,
            precedence: self.precedence.or(next.precedence),
            associativity: self.associativity.or(next.associativity),
            dynamic_precedence: self.dynamic_precedence.or(next.dynamic_precedence),
        }
    }
}

struct Lowering {
    names: Rodeo,
    by_name: HashMap<Spur, Symbol, ahash::RandomState>,
    anonymous: HashMap<(bool, String), Symbol, ahash::RandomState>,
    symbols: Vec<SymbolInfo>,
    tokens: Vec<TokenDef>,
    origin: Vec<Symbol>,
    productions: Vec<FlatProduction>,
    helpers: HashMap<Symbol, usize, ahash::RandomState>,
}

/// Lower every rule of `builder`.
pub(crate) fn lower(builder: &GrammarBuilder) -> Result<Grammar, GrammarError> {
    let Some((start_name, _)) = builder.rules.first() else {
        return Err(GrammarError::EmptyGrammar);
    };

    let mut lowering = Lowering {
        names: Rodeo::default(),
        by_name: HashMap::default(),
        anonymous: HashMap::default(),
        symbols: vec![
            SymbolInfo {
                name: CompactString::new("end"),
                terminal: true,
                named: false,
                visible: false,
                extra: false,
            },
            SymbolInfo {
                name: CompactString::new("ERROR"),
                terminal: true,
                named: true,
                visible: true,
                extra: false,
            },
        ],
        tokens: Vec::new(),
        origin: vec![Symbol::END, Symbol::ERROR],
        productions: Vec::new(),
        helpers: HashMap::default(),
    };

    let mut seen = HashSet::<&str, ahash::RandomState>::default();
    let rules: Vec<(&str, &Expr)> = builder
        .rules
        .iter()
        .filter(|(name, _)| {
            let first = seen.insert(name.as_str());
            if !first {
                log::warn!("rule `{name}` is defined twice; keeping the first definition");
            }
            first
        })
        .map(|(name, body)| (name.as_str(), body))
        .collect();

    for &(name, body) in &rules {
        if let Some(pattern) = token_rule_pattern(body)? {
            let symbol = lowering.add_symbol(name, true, true)?;
            lowering.add_token(name, symbol, pattern)?;
        }
    }
    for name in &builder.externals {
        match lowering.lookup(name) {
            Some(symbol) if lowering.symbols[symbol.index()].terminal => {}
            _ if rules.iter().any(|(rule, _)| *rule == name.as_str()) => {
                return Err(GrammarError::InvalidPattern {
                    name: name.clone(),
                    reason: "external tokens cannot be nonterminal rules".into(),
                });
            }
            _ => {
                lowering.add_symbol(name, true, true)?;
            }
        }
    }
    for extra in &builder.extras {
        lowering.collect_anonymous(extra)?;
    }
    for &(name, body) in &rules {
        if !lowering.is_token_rule(name) {
            lowering.collect_anonymous(body)?;
        }
    }
    let nonterminals: Vec<(&str, &Expr)> = rules
        .iter()
        .copied()
        .filter(|(name, _)| !lowering.is_token_rule(name))
        .collect();
    for &(name, _) in &nonterminals {
        lowering.add_symbol(name, false, !name.starts_with('_'))?;
    }

    for &(name, body) in &nonterminals {
        let lhs = lowering.resolve(name)?;
        let alternatives = lowering.alternatives(body, lhs)?;
        lowering.push_productions(lhs, alternatives)?;
    }

    let start = lowering.resolve(start_name)?;
    if lowering.symbols[start.index()].terminal {
        return Err(GrammarError::InvalidPattern {
            name: start_name.clone(),
            reason: "the start rule cannot be a token".into(),
        });
    }

    let mut extras = Vec::with_capacity(builder.extras.len());
    for extra in &builder.extras {
        let symbol = match extra {
            Expr::Symbol(name) => lowering.resolve(name)?,
            other => lowering.anonymous_symbol(other)?,
        };
        if !lowering.symbols[symbol.index()].terminal {
            return Err(GrammarError::InvalidPattern {
                name: lowering.symbols[symbol.index()].name.to_string(),
                reason: "extras must be tokens".into(),
            });
        }
        lowering.symbols[symbol.index()].extra = true;
        extras.push(symbol);
    }

    let word = match &builder.word {
        Some(name) => {
            let symbol = lowering.resolve(name)?;
            if !lowering.symbols[symbol.index()].terminal {
                return Err(GrammarError::InvalidPattern {
                    name: name.clone(),
                    reason: "the word token must be a token rule".into(),
                });
            }
            Some(symbol)
        }
        None => None,
    };

    let externals = builder
        .externals
        .iter()
        .map(|name| lowering.resolve(name))
        .collect::<Result<Vec<_>, _>>()?;
    let conflicts = builder
        .conflicts
        .iter()
        .map(|set| set.iter().map(|name| lowering.resolve(name)).collect())
        .collect::<Result<Vec<BTreeSet<_>>, _>>()?;

    if lowering.productions.len() >= usize::from(crate::syntax::NO_PRODUCTION) {
        return Err(GrammarError::TooLarge {
            what: "production count",
        });
    }

    Ok(Grammar {
        name: builder.name.clone(),
        symbols: lowering.symbols,
        tokens: lowering.tokens,
        productions: lowering.productions,
        start,
        extras,
        word,
        externals,
        conflicts,
        origin: lowering.origin,
    })
}

impl Lowering {
    fn lookup(&self, name: &str) -> Option<Symbol> {
        let key = self.names.get(name)?;
        self.by_name.get(&key).copied()
    }

    fn resolve(&self, name: &str) -> Result<Symbol, GrammarError> {
        self.lookup(name).ok_or_else(|| GrammarError::UndefinedRule {
            name: name.to_owned(),
        })
    }

    fn is_token_rule(&self, name: &str) -> bool {
        self.lookup(name)
            .is_some_and(|symbol| self.symbols[symbol.index()].terminal)
    }

    fn next_symbol(&self) -> Result<Symbol, GrammarError> {
        u16::try_from(self.symbols.len())
            .ok()
            .filter(|&id| id < u16::MAX)
            .map(Symbol)
            .ok_or(GrammarError::TooLarge {
                what: "symbol count",
            })
    }

    fn add_symbol(&mut self, name: &str, terminal: bool, visible: bool) -> Result<Symbol, GrammarError> {
        let symbol = self.next_symbol()?;
        let key = self.names.get_or_intern(name);
        self.by_name.insert(key, symbol);
        self.symbols.push(SymbolInfo {
            name: CompactString::new(name),
            terminal,
            named: true,
            visible,
            extra: false,
        });
        self.origin.push(symbol);
        Ok(symbol)
    }

    fn add_token(&mut self, name: &str, symbol: Symbol, pattern: TokenPattern) -> Result<(), GrammarError> {
        check_pattern(name, &pattern)?;
        self.tokens.push(TokenDef { symbol, pattern });
        Ok(())
    }

    /// Register the anonymous tokens used by `expr`, in order.
    fn collect_anonymous(&mut self, expr: &Expr) -> Result<(), GrammarError> {
        match expr {
            Expr::String(_) | Expr::Pattern(_) | Expr::Token(_) => {
                let pattern = anonymous_pattern(expr)?;
                let key = (pattern.is_literal(), pattern_source(&pattern));
                if self.anonymous.contains_key(&key) {
                    return Ok(());
                }
                let symbol = self.next_symbol()?;
                let literal = pattern.is_literal();
                self.symbols.push(SymbolInfo {
                    name: CompactString::new(&key.1),
                    terminal: true,
                    named: false,
                    visible: literal,
                    extra: false,
                });
                self.origin.push(symbol);
                self.add_token(&key.1, symbol, pattern)?;
                self.anonymous.insert(key, symbol);
                Ok(())
            }
            Expr::Seq(items) | Expr::Choice(items) => {
                items.iter().try_for_each(|item| self.collect_anonymous(item))
            }
            Expr::Repeat(item)
            | Expr::Repeat1(item)
            | Expr::Optional(item)
            | Expr::Prec(_, item)
            | Expr::PrecLeft(_, item)
            | Expr::PrecRight(_, item)
            | Expr::PrecDynamic(_, item) => self.collect_anonymous(item),
            Expr::Blank | Expr::Symbol(_) => Ok(()),
        }
    }

    fn anonymous_symbol(&self, expr: &Expr) -> Result<Symbol, GrammarError> {
        let pattern = anonymous_pattern(expr)?;
        let key = (pattern.is_literal(), pattern_source(&pattern));
        self.anonymous
            .get(&key)
            .copied()
            .ok_or_else(|| GrammarError::UndefinedRule { name: key.1 })
    }

    fn alternatives(&mut self, expr: &Expr, rule: Symbol) -> Result<Vec<Alternative>, GrammarError> {
        let alternatives = match expr {
            Expr::Blank => vec![Alternative::default()],
            Expr::Symbol(name) => vec![Alternative::single(self.resolve(name)?)],
            Expr::String(_) | Expr::Pattern(_) | Expr::Token(_) => {
                vec![Alternative::single(self.anonymous_symbol(expr)?)]
            }
            Expr::Seq(items) => {
                let mut product = vec![Alternative::default()];
                for item in items {
                    let next = self.alternatives(item, rule)?;
                    if product.len().saturating_mul(next.len()) > MAX_ALTERNATIVES {
                        return Err(GrammarError::TooLarge {
                            what: "alternatives in one rule",
                        });
                    }
                    product = product
                        .iter()
                        .flat_map(|head| next.iter().map(|tail| head.concat(tail)))
                        .collect();
                }
                product
            }
            Expr::Choice(items) => {
                let mut all = Vec::new();
                for item in items {
                    all.extend(self.alternatives(item, rule)?);
                }
                all
            }
            Expr::Optional(item) => {
                let mut all = vec![Alternative::default()];
                all.extend(self.alternatives(item, rule)?);
                all
            }
            Expr::Repeat(item) => {
                let helper = self.repeat_helper(item, rule)?;
                vec![Alternative::default(), Alternative::single(helper)]
            }
            Expr::Repeat1(item) => vec![Alternative::single(self.repeat_helper(item, rule)?)],
            Expr::Prec(level, item) => {
                self.with_precedence(item, rule, |alt| {
                    alt.precedence.get_or_insert(*level);
                })?
            }
            Expr::PrecLeft(level, item) => self.with_precedence(item, rule, |alt| {
                alt.precedence.get_or_insert(*level);
                alt.associativity.get_or_insert(Associativity::Left);
            })?,
            Expr::PrecRight(level, item) => self.with_precedence(item, rule, |alt| {
                alt.precedence.get_or_insert(*level);
                alt.associativity.get_or_insert(Associativity::Right);
            })?,
            Expr::PrecDynamic(level, item) => self.with_precedence(item, rule, |alt| {
                alt.dynamic_precedence.get_or_insert(*level);
            })?,
        };
        if alternatives.len() > MAX_ALTERNATIVES {
            return Err(GrammarError::TooLarge {
                what: "alternatives in one rule",
            });
        }
        Ok(alternatives)
    }

    fn with_precedence(
        &mut self,
        item: &Expr,
        rule: Symbol,
        apply: impl Fn(&mut Alternative),
    ) -> Result<Vec<Alternative>, GrammarError> {
        let mut alternatives = self.alternatives(item, rule)?;
        alternatives.iter_mut().for_each(apply);
        Ok(alternatives)
    }

    /// Hidden left-recursive rule matching one or more `item`.
    fn repeat_helper(&mut self, item: &Expr, rule: Symbol) -> Result<Symbol, GrammarError> {
        let counter = self.helpers.entry(rule).or_insert(0);
        *counter += 1;
        let name = format!("{}_repeat{counter}", self.symbols[rule.index()].name);
        let helper = self.next_symbol()?;
        self.symbols.push(SymbolInfo {
            name: CompactString::new(&name),
            terminal: false,
            named: false,
            visible: false,
            extra: false,
        });
        let origin = self.origin[rule.index()];
        self.origin.push(origin);

        let body = self.alternatives(item, rule)?;
        let recursive = Alternative::single(helper);
        let alternatives = body
            .iter()
            .map(|alt| recursive.concat(alt))
            .chain(body.iter().cloned())
            .collect();
        self.push_productions(helper, alternatives)?;
        Ok(helper)
    }

    fn push_productions(&mut self, lhs: Symbol, alternatives: Vec<Alternative>) -> Result<(), GrammarError> {
        let mut seen = HashSet::<Vec<Symbol>, ahash::RandomState>::default();
        for alternative in alternatives {
            if !seen.insert(alternative.symbols.clone()) {
                continue;
            }
            if alternative.symbols.len() > usize::from(u16::MAX) {
                return Err(GrammarError::TooLarge {
                    what: "production length",
                });
            }
            self.productions.push(FlatProduction {
                lhs,
                rhs: alternative.symbols,
                precedence: alternative.precedence.unwrap_or(0),
                associativity: alternative.associativity.unwrap_or_default(),
                dynamic_precedence: alternative.dynamic_precedence.unwrap_or(0),
            });
        }
        Ok(())
    }
}

/// The token pattern of a rule that is a single token, if it is one.
fn token_rule_pattern(body: &Expr) -> Result<Option<TokenPattern>, GrammarError> {
    match body {
        Expr::String(_) | Expr::Pattern(_) | Expr::Token(_) => anonymous_pattern(body).map(Some),
        _ => Ok(None),
    }
}

fn anonymous_pattern(expr: &Expr) -> Result<TokenPattern, GrammarError> {
    Ok(match expr {
        Expr::String(text) => TokenPattern::Literal(text.clone()),
        Expr::Pattern(source) => TokenPattern::Regex(source.clone()),
        Expr::Token(inner) => match inner.as_ref() {
            Expr::String(text) => TokenPattern::Literal(text.clone()),
            other => TokenPattern::Regex(to_regex(other)?),
        },
        other => TokenPattern::Regex(to_regex(other)?),
    })
}

fn pattern_source(pattern: &TokenPattern) -> String {
    match pattern {
        TokenPattern::Literal(text) | TokenPattern::Regex(text) => text.clone(),
    }
}

/// Regex for lexical content.
fn to_regex(expr: &Expr) -> Result<String, GrammarError> {
    Ok(match expr {
        Expr::String(text) => regex_syntax::escape(text),
        Expr::Pattern(source) => format!("(?:{source})"),
        Expr::Blank => String::new(),
        Expr::Seq(items) => items.iter().map(to_regex).collect::<Result<String, _>>()?,
        Expr::Choice(items) => {
            let branches = items.iter().map(to_regex).collect::<Result<Vec<_>, _>>()?;
            format!("(?:{})", branches.join("|"))
        }
        Expr::Repeat(item) => format!("(?:{})*", to_regex(item)?),
        Expr::Repeat1(item) => format!("(?:{})+", to_regex(item)?),
        Expr::Optional(item) => format!("(?:{})?", to_regex(item)?),
        Expr::Token(item)
        | Expr::Prec(_, item)
        | Expr::PrecLeft(_, item)
        | Expr::PrecRight(_, item)
        | Expr::PrecDynamic(_, item) => to_regex(item)?,
        Expr::Symbol(name) => {
            return Err(GrammarError::InvalidPattern {
                name: name.clone(),
                reason: "tokens cannot refer to other rules".into(),
            });
        }
    })
}

fn check_pattern(name: &str, pattern: &TokenPattern) -> Result<(), GrammarError> {
    let source = pattern.to_regex();
    let hir = regex_syntax::Parser::new()
        .parse(&source)
        .map_err(|error| GrammarError::InvalidPattern {
            name: name.to_owned(),
            reason: error.to_string(),
        })?;
    if hir.properties().minimum_len() == Some(0) {
        return Err(GrammarError::EmptyToken {
            name: name.to_owned(),
        });
    }
    Ok(())
}
