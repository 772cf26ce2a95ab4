//! Per-request view over route parameters and the decoded command.

use std::collections::HashMap;
use std::sync::Arc;

use litedb_protocol::{Command, Operation, TypedPayload};
use thiserror::Error;

use crate::route::RouteMatch;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("parameter {0:?} was not bound by the route")]
    NotFound(String),

    #[error("parameter {name:?} with value {value:?} cannot be converted to {target}")]
    TypeConversion {
        name: String,
        value: String,
        target: &'static str,
    },
}

/// Conversion from a bound route value.
pub trait FromParameter: Sized {
    /// Type name used in conversion errors.
    const TYPE_NAME: &'static str;

    fn from_parameter(value: &str) -> Option<Self>;
}

impl FromParameter for String {
    const TYPE_NAME: &'static str = "string";

    fn from_parameter(value: &str) -> Option<Self> {
        Some(value.to_string())
    }
}

impl FromParameter for bool {
    const TYPE_NAME: &'static str = "bool";

    /// Anything other than a case-insensitive `true` is `false`.
    fn from_parameter(value: &str) -> Option<Self> {
        Some(value.trim().eq_ignore_ascii_case("true"))
    }
}

macro_rules! numeric_parameter {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromParameter for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_parameter(value: &str) -> Option<Self> {
                    value.trim().parse().ok()
                }
            }
        )*
    };
}

numeric_parameter! {
    i32 => "i32",
    i64 => "i64",
    f64 => "f64",
    u8 => "u8",
}

/// Everything a handler knows about the command it is serving.
///
/// Built once per request from the route match; never reused.
#[derive(Debug, Clone)]
pub struct CommandContext {
    client_id: String,
    operation: Operation,
    params: HashMap<String, String>,
    command: Arc<Command>,
}

impl CommandContext {
    pub fn new(client_id: impl Into<String>, route_match: RouteMatch, command: Arc<Command>) -> Self {
        let operation = route_match.operation();
        Self {
            client_id: client_id.into(),
            operation,
            params: route_match.into_params(),
            command,
        }
    }

    /// Typed access to a bound route variable.
    pub fn param<T: FromParameter>(&self, name: &str) -> Result<T, ParameterError> {
        let value = self
            .params
            .get(name)
            .ok_or_else(|| ParameterError::NotFound(name.to_string()))?;
        T::from_parameter(value).ok_or_else(|| ParameterError::TypeConversion {
            name: name.to_string(),
            value: value.clone(),
            target: T::TYPE_NAME,
        })
    }

    pub fn raw(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn path(&self) -> &str {
        &self.command.path
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn payload(&self) -> Option<&TypedPayload> {
        self.command.data.as_ref()
    }
}
