//! Argument-spec construction and the binding algorithm (§4.1, §4.6).

use crate::error::BindingError;
use crate::frame::Args;
use crate::value::Value;

/// One parameter of a registered procedure: a name and an optional default.
#[derive(Clone, Debug, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub default: Option<Value>,
}

impl ArgSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

impl From<&str> for ArgSpec {
    fn from(name: &str) -> Self {
        ArgSpec::required(name)
    }
}

impl From<(&str, Value)> for ArgSpec {
    fn from((name, default): (&str, Value)) -> Self {
        ArgSpec::with_default(name, default)
    }
}

/// A procedure's fixed-arity argument specification list.
#[derive(Clone, Debug, Default)]
pub struct ArgSpecs {
    specs: Vec<ArgSpec>,
    allow_extra_arguments: bool,
}

impl ArgSpecs {
    /// Auto-generated names `"0"`, `"1"`, ... `"N-1"`, no defaults — used
    /// when a procedure is registered without an explicit spec list.
    pub fn auto(arity: usize) -> Self {
        Self {
            specs: (0..arity).map(|i| ArgSpec::required(i.to_string())).collect(),
            allow_extra_arguments: false,
        }
    }

    pub fn new(specs: impl IntoIterator<Item = impl Into<ArgSpec>>) -> Self {
        Self {
            specs: specs.into_iter().map(Into::into).collect(),
            allow_extra_arguments: false,
        }
    }

    #[must_use]
    pub fn allow_extra_arguments(mut self) -> Self {
        self.allow_extra_arguments = true;
        self
    }

    pub fn arity(&self) -> usize {
        self.specs.len()
    }

    pub fn specs(&self) -> &[ArgSpec] {
        &self.specs
    }
}

/// Binds a parsed argument container against a procedure's spec list,
/// producing an ordered N-tuple or a [`BindingError`].
///
/// `supports_named` is a dialect capability: the msgpack dialect rejects
/// the named-container form entirely (§4.1), while JSON-RPC 2.0 accepts it.
pub fn bind(args: &Args, specs: &ArgSpecs, supports_named: bool) -> Result<Vec<Value>, BindingError> {
    match args {
        Args::Positional(values) => bind_positional(values, specs),
        Args::Named(pairs) => {
            if !supports_named {
                return Err(BindingError::NamedArgumentsUnsupported);
            }
            bind_named(pairs, specs)
        }
    }
}

fn bind_positional(values: &[Value], specs: &ArgSpecs) -> Result<Vec<Value>, BindingError> {
    let n = specs.arity();
    let k = values.len();

    if k > n && !specs.allow_extra_arguments {
        return Err(BindingError::TooManyArguments { expected: n, got: k });
    }

    let mut bound = Vec::with_capacity(n);
    for (i, spec) in specs.specs().iter().enumerate() {
        if i < k {
            bound.push(values[i].clone());
        } else if let Some(default) = &spec.default {
            bound.push(default.clone());
        } else {
            return Err(BindingError::MissingArgument(spec.name.clone()));
        }
    }
    Ok(bound)
}

fn bind_named(pairs: &[(String, Value)], specs: &ArgSpecs) -> Result<Vec<Value>, BindingError> {
    let mut bound = Vec::with_capacity(specs.arity());
    for spec in specs.specs() {
        match pairs.iter().find(|(name, _)| name == &spec.name) {
            Some((_, value)) => bound.push(value.clone()),
            None => match &spec.default {
                Some(default) => bound.push(default.clone()),
                None => return Err(BindingError::MissingArgument(spec.name.clone())),
            },
        }
    }
    Ok(bound)
}
