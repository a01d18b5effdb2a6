//! Human-readable call signatures of the form `name(inType,..)(outType,..)`.
//!
//! A [`Signature`] computes the function selector, encodes call arguments and decodes
//! responses. A [`Call`] binds a signature and its arguments to a target contract.

use std::{fmt, str::FromStr, sync::Arc};

use alloy::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::{keccak256, Address, Bytes, Selector, U256},
};

use crate::common::AbiError;

pub mod json;

/// A parsed function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    name: String,
    inputs: Vec<DynSolType>,
    outputs: Vec<DynSolType>,
    selector: Selector,
}

impl Signature {
    /// Parses `name(inType1,inType2)(outType1,outType2)`.
    ///
    /// The output group may be omitted for functions that return nothing.
    pub fn parse(signature: &str) -> Result<Self, AbiError> {
        let malformed = || AbiError::MalformedSignature(signature.to_owned());
        let signature = signature.trim();

        let open = signature.find('(').ok_or_else(malformed)?;
        let name = &signature[..open];
        let valid_char = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$';
        if name.is_empty() || !name.chars().all(valid_char) {
            return Err(malformed())
        }

        let (inputs, rest) = take_group(&signature[open..]).ok_or_else(malformed)?;
        let outputs = if rest.is_empty() {
            ""
        } else {
            let (outputs, tail) = take_group(rest).ok_or_else(malformed)?;
            if !tail.is_empty() {
                return Err(malformed())
            }
            outputs
        };

        let inputs = parse_types(inputs, signature)?;
        let outputs = parse_types(outputs, signature)?;
        let selector = selector(name, &inputs);

        Ok(Self { name: name.to_owned(), inputs, outputs, selector })
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input types.
    pub fn inputs(&self) -> &[DynSolType] {
        &self.inputs
    }

    /// Output types.
    pub fn outputs(&self) -> &[DynSolType] {
        &self.outputs
    }

    /// The 4-byte function selector.
    pub fn selector(&self) -> Selector {
        self.selector
    }

    /// The canonical `name(inputs)` form the selector is derived from.
    pub fn canonical(&self) -> String {
        format!("{}({})", self.name, join_types(&self.inputs))
    }

    /// Encodes `selector ++ abi_encode(args)`.
    pub fn encode_data(&self, args: &[DynSolValue]) -> Result<Bytes, AbiError> {
        if args.len() != self.inputs.len() {
            return Err(AbiError::ArgumentCount { expected: self.inputs.len(), got: args.len() })
        }
        for (index, (ty, arg)) in self.inputs.iter().zip(args).enumerate() {
            if !ty.matches(arg) {
                return Err(AbiError::ArgumentType { index, ty: ty.sol_type_name().into_owned() })
            }
        }

        let mut data = self.selector.to_vec();
        data.extend(DynSolValue::Tuple(args.to_vec()).abi_encode_params());

        Ok(data.into())
    }

    /// Decodes a response. Returns the bare value if there is exactly one output type,
    /// a tuple otherwise.
    ///
    /// The response must be the canonical encoding of the decoded values. Trailing or
    /// missing bytes, dirty padding and values outside their declared width are errors.
    pub fn decode_data(&self, data: &[u8]) -> Result<DynSolValue, AbiError> {
        let decoded = DynSolType::Tuple(self.outputs.clone()).abi_decode_params(data)?;
        check_width(&decoded)?;

        let canonical = decoded.abi_encode_params();
        if canonical.len() != data.len() {
            return Err(AbiError::LengthMismatch { expected: canonical.len(), got: data.len() })
        }
        if canonical != data {
            let ty = decoded.sol_type_name().unwrap_or_default();
            return Err(AbiError::NonCanonical(ty.into_owned()))
        }

        match decoded {
            DynSolValue::Tuple(mut values) if values.len() == 1 => Ok(values.remove(0)),
            other => Ok(other),
        }
    }
}

/// Rejects values that do not fit the bit or byte width of their type. These re-encode to
/// the same word they were decoded from, so comparing encodings alone misses them.
fn check_width(value: &DynSolValue) -> Result<(), AbiError> {
    let fits = match value {
        DynSolValue::Uint(v, bits) => v.bit_len() <= *bits,
        DynSolValue::Int(v, bits) if *bits < 256 => {
            let limit = U256::from(1) << (*bits - 1);
            if v.is_negative() {
                v.unsigned_abs() <= limit
            } else {
                v.unsigned_abs() < limit
            }
        }
        DynSolValue::FixedBytes(word, size) => word[*size..].iter().all(|b| *b == 0),
        DynSolValue::Array(values) |
        DynSolValue::FixedArray(values) |
        DynSolValue::Tuple(values) => return values.iter().try_for_each(check_width),
        _ => true,
    };

    if fits {
        Ok(())
    } else {
        let ty = value.sol_type_name().unwrap_or_default();
        Err(AbiError::NonCanonical(ty.into_owned()))
    }
}

impl FromStr for Signature {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.canonical(), join_types(&self.outputs))
    }
}

/// A read-only contract call: a target, an encoded request and the name its decoded
/// output is reported under.
///
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct Call {
    target: Address,
    signature: Arc<Signature>,
    calldata: Bytes,
    returns: String,
}

impl Call {
    /// Parses `signature` and encodes `args` for a call against `target`.
    ///
    /// The output is named after the function unless [`Call::returns`] says otherwise.
    pub fn new(target: Address, signature: &str, args: &[DynSolValue]) -> Result<Self, AbiError> {
        Self::with_signature(target, Arc::new(Signature::parse(signature)?), args)
    }

    /// Builds a call from an already parsed signature, which may be shared by many calls.
    pub fn with_signature(
        target: Address,
        signature: Arc<Signature>,
        args: &[DynSolValue],
    ) -> Result<Self, AbiError> {
        let calldata = signature.encode_data(args)?;
        let returns = signature.name().to_owned();

        Ok(Self { target, signature, calldata, returns })
    }

    /// Sets the name the decoded output is reported under.
    pub fn returns(mut self, name: impl Into<String>) -> Self {
        self.returns = name.into();
        self
    }

    /// The contract this call is sent to.
    pub fn target(&self) -> Address {
        self.target
    }

    /// The encoded request payload.
    pub fn calldata(&self) -> &Bytes {
        &self.calldata
    }

    /// The name the decoded output is reported under.
    pub fn name(&self) -> &str {
        &self.returns
    }

    /// The signature of the called function.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Decodes a raw response to this call.
    pub fn decode_output(&self, output: &[u8]) -> Result<DynSolValue, AbiError> {
        self.signature.decode_data(output)
    }
}

fn selector(name: &str, inputs: &[DynSolType]) -> Selector {
    let hash = keccak256(format!("{name}({})", join_types(inputs)));
    Selector::from_slice(&hash[..4])
}

fn join_types(types: &[DynSolType]) -> String {
    types.iter().map(|ty| ty.sol_type_name()).collect::<Vec<_>>().join(",")
}

/// Splits a leading parenthesized group off `s`, returning its contents and the rest.
fn take_group(s: &str) -> Option<(&str, &str)> {
    if !s.starts_with('(') {
        return None
    }

    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[1..i], &s[i + 1..]))
                }
            }
            _ => {}
        }
    }

    None
}

/// Parses a comma separated type list, respecting nested tuples.
fn parse_types(list: &str, signature: &str) -> Result<Vec<DynSolType>, AbiError> {
    if list.trim().is_empty() {
        return Ok(Vec::new())
    }

    let mut types = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                types.push(parse_type(&list[start..i], signature)?);
                start = i + 1;
            }
            _ => {}
        }
    }
    types.push(parse_type(&list[start..], signature)?);

    Ok(types)
}

fn parse_type(ty: &str, signature: &str) -> Result<DynSolType, AbiError> {
    let ty = ty.trim();
    if ty.is_empty() {
        return Err(AbiError::MalformedSignature(signature.to_owned()))
    }

    DynSolType::parse(ty).map_err(|source| AbiError::UnknownType { ty: ty.to_owned(), source })
}
