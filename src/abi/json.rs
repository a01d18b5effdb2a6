//! Checks a JSON ABI of a non-default deployment against the static call layouts.

use std::{fs::File, io::BufReader, path::Path};

use alloy::{
    dyn_abi::DynSolType,
    json_abi::{JsonAbi, Param},
};

use super::Signature;
use crate::common::ConfigError;

/// A JSON ABI supplied for a non-default deployment.
///
/// Field layouts are always decoded with the static bindings; an override is only checked
/// against them so that a deployment with a different layout fails at construction instead
/// of decoding garbage.
#[derive(Debug, Clone)]
pub struct AbiOverride {
    abi: JsonAbi,
}

impl AbiOverride {
    /// Reads a JSON ABI file (a plain array of ABI items).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = BufReader::new(File::open(path)?);
        let abi: JsonAbi = serde_json::from_reader(file)?;

        Ok(Self { abi })
    }

    /// Parses a JSON ABI string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(Self { abi: serde_json::from_str(json)? })
    }

    /// Checks that the ABI declares a function with the exact inputs and outputs of
    /// `expected`, given as `name(inputs)(outputs)`.
    pub fn check(&self, expected: &str) -> Result<(), ConfigError> {
        let expected = Signature::parse(expected)?;
        let overloads = self
            .abi
            .function(expected.name())
            .ok_or_else(|| ConfigError::MissingFunction(expected.name().to_owned()))?;

        let matches = overloads.iter().any(|function| {
            let inputs = function.inputs.iter().map(param_type);
            let outputs = function.outputs.iter().map(param_type);

            same_types(inputs, expected.inputs()) && same_types(outputs, expected.outputs())
        });

        if matches {
            Ok(())
        } else {
            Err(ConfigError::AbiMismatch {
                function: expected.name().to_owned(),
                expected: expected.to_string(),
            })
        }
    }
}

/// Renders a parameter type, expanding `tuple` components.
fn param_type(param: &Param) -> String {
    match param.ty.strip_prefix("tuple") {
        Some(suffix) => {
            let components = param.components.iter().map(param_type).collect::<Vec<_>>();
            format!("({}){suffix}", components.join(","))
        }
        None => param.ty.clone(),
    }
}

fn same_types<S: AsRef<str>>(
    types: impl ExactSizeIterator<Item = S>,
    expected: &[DynSolType],
) -> bool {
    types.len() == expected.len() &&
        types
            .zip(expected)
            .all(|(ty, expected)| DynSolType::parse(ty.as_ref()).is_ok_and(|ty| &ty == expected))
}
