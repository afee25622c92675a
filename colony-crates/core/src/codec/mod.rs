//! The wire format of a dense utility space.
//!
//! The field order is part of the contract with existing consumers: name,
//! relation name, variable count and names, per-variable domains (the
//! value type tag is carried once, on the first value of the first
//! domain), the infeasible utility, the utility count, the utility type
//! tag, and the utilities in flat-array order.

use std::io::Read;
use std::io::Write;

use crate::spaces::Hypercube;
use crate::values::DomainValue;
use crate::values::Real;
use crate::values::UtilityValue;

/// The numeric kinds a serialised value can have.
///
/// The tag is a serialisation-level discriminator only; inside the
/// algebra, value types are static.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeTag {
    I32,
    I64,
    Real,
}

impl TypeTag {
    fn to_byte(self) -> u8 {
        match self {
            TypeTag::I32 => 0,
            TypeTag::I64 => 1,
            TypeTag::Real => 2,
        }
    }

    fn from_byte(byte: u8) -> Result<TypeTag, CodecError> {
        match byte {
            0 => Ok(TypeTag::I32),
            1 => Ok(TypeTag::I64),
            2 => Ok(TypeTag::Real),
            other => Err(CodecError::InvalidTag(other)),
        }
    }
}

/// Errors when reading a serialised space.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown type tag {0}")]
    InvalidTag(u8),
    #[error("expected a {expected:?} value, found {found:?}")]
    TypeMismatch { expected: TypeTag, found: TypeTag },
    #[error("malformed space: {0}")]
    Malformed(&'static str),
    #[error("malformed string: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A value that can cross the wire.
pub trait WireValue: Sized {
    /// The tag identifying this type on the wire.
    const TAG: TypeTag;

    fn write(&self, writer: &mut impl Write) -> Result<(), CodecError>;

    fn read(reader: &mut impl Read) -> Result<Self, CodecError>;
}

impl WireValue for i32 {
    const TAG: TypeTag = TypeTag::I32;

    fn write(&self, writer: &mut impl Write) -> Result<(), CodecError> {
        Ok(writer.write_all(&self.to_be_bytes())?)
    }

    fn read(reader: &mut impl Read) -> Result<i32, CodecError> {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes)?;
        Ok(i32::from_be_bytes(bytes))
    }
}

impl WireValue for i64 {
    const TAG: TypeTag = TypeTag::I64;

    fn write(&self, writer: &mut impl Write) -> Result<(), CodecError> {
        Ok(writer.write_all(&self.to_be_bytes())?)
    }

    fn read(reader: &mut impl Read) -> Result<i64, CodecError> {
        let mut bytes = [0u8; 8];
        reader.read_exact(&mut bytes)?;
        Ok(i64::from_be_bytes(bytes))
    }
}

impl WireValue for Real {
    const TAG: TypeTag = TypeTag::Real;

    fn write(&self, writer: &mut impl Write) -> Result<(), CodecError> {
        Ok(writer.write_all(&self.value().to_be_bytes())?)
    }

    fn read(reader: &mut impl Read) -> Result<Real, CodecError> {
        let mut bytes = [0u8; 8];
        reader.read_exact(&mut bytes)?;
        let value = f64::from_be_bytes(bytes);
        if value.is_nan() {
            return Err(CodecError::Malformed("a utility cannot be NaN"));
        }
        Ok(Real::new(value))
    }
}

fn write_string(text: &str, writer: &mut impl Write) -> Result<(), CodecError> {
    let bytes = text.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(CodecError::Malformed("string too long"));
    }
    writer.write_all(&(bytes.len() as u16).to_be_bytes())?;
    Ok(writer.write_all(bytes)?)
}

fn read_string(reader: &mut impl Read) -> Result<String, CodecError> {
    let length = read_u16(reader)? as usize;
    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

fn read_u16(reader: &mut impl Read) -> Result<u16, CodecError> {
    let mut bytes = [0u8; 2];
    reader.read_exact(&mut bytes)?;
    Ok(u16::from_be_bytes(bytes))
}

fn read_u32(reader: &mut impl Read) -> Result<u32, CodecError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_tag(reader: &mut impl Read, expected: TypeTag) -> Result<(), CodecError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    let found = TypeTag::from_byte(byte[0])?;
    if found != expected {
        return Err(CodecError::TypeMismatch { expected, found });
    }
    Ok(())
}

/// Serialises a dense space.
///
/// Writing the utility array counts one constraint check per utility.
pub fn write_space<V, U>(
    space: &Hypercube<V, U>,
    writer: &mut impl Write,
) -> Result<(), CodecError>
where
    V: DomainValue + WireValue,
    U: UtilityValue + WireValue,
{
    write_string(space.name(), writer)?;
    write_string(space.relation(), writer)?;

    let variables = space.variables();
    if variables.len() > u16::MAX as usize {
        return Err(CodecError::Malformed("too many variables"));
    }
    writer.write_all(&(variables.len() as u16).to_be_bytes())?;
    for var in variables {
        write_string(var, writer)?;
    }

    let domains = space.domains();
    writer.write_all(&(domains.len() as u16).to_be_bytes())?;
    for (index, dom) in domains.iter().enumerate() {
        if dom.len() > u16::MAX as usize {
            return Err(CodecError::Malformed("domain too large"));
        }
        writer.write_all(&(dom.len() as u16).to_be_bytes())?;
        if index == 0 {
            writer.write_all(&[V::TAG.to_byte()])?;
        }
        for value in dom {
            value.write(writer)?;
        }
    }

    space.infeasible().write(writer)?;

    let utilities = space.raw_values();
    writer.write_all(&(utilities.len() as u32).to_be_bytes())?;
    writer.write_all(&[U::TAG.to_byte()])?;
    for utility in utilities {
        utility.write(writer)?;
    }
    if let Some(checks) = space.checks() {
        checks.increment(utilities.len() as u64);
    }

    Ok(())
}

/// Deserialises a dense space written by [`write_space`].
pub fn read_space<V, U>(reader: &mut impl Read) -> Result<Hypercube<V, U>, CodecError>
where
    V: DomainValue + WireValue,
    U: UtilityValue + WireValue,
{
    let name = read_string(reader)?;
    let relation = read_string(reader)?;

    let nbr_vars = read_u16(reader)? as usize;
    if nbr_vars == 0 {
        return Err(CodecError::Malformed("a space must have variables"));
    }
    let mut variables = Vec::with_capacity(nbr_vars);
    for _ in 0..nbr_vars {
        variables.push(read_string(reader)?);
    }

    let nbr_doms = read_u16(reader)? as usize;
    if nbr_doms != nbr_vars {
        return Err(CodecError::Malformed("variable and domain counts differ"));
    }
    let mut domains = Vec::with_capacity(nbr_doms);
    let mut expected_count: u64 = 1;
    for index in 0..nbr_doms {
        let size = read_u16(reader)? as usize;
        if size == 0 {
            return Err(CodecError::Malformed("a domain cannot be empty"));
        }
        if index == 0 {
            read_tag(reader, V::TAG)?;
        }
        let mut dom = Vec::with_capacity(size);
        for _ in 0..size {
            dom.push(V::read(reader)?);
        }
        expected_count = expected_count.saturating_mul(size as u64);
        domains.push(dom);
    }

    let infeasible = U::read(reader)?;

    let count = read_u32(reader)? as u64;
    if count != expected_count {
        return Err(CodecError::Malformed("utility count does not match the domains"));
    }
    read_tag(reader, U::TAG)?;
    let mut utilities = Vec::with_capacity(count as usize);
    for _ in 0..count {
        utilities.push(U::read(reader)?);
    }

    let mut space = Hypercube::new(variables, domains, utilities, infeasible);
    space.set_name(name);
    space.set_relation(relation);
    Ok(space)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::test_helpers::*;

    #[test]
    fn a_space_round_trips_through_the_wire() {
        let mut cube = two_var_cube();
        cube.set_name("prices");
        cube.set_relation("price_table");

        let mut wire = Vec::new();
        write_space(&cube, &mut wire).expect("writing to a vec cannot fail");

        let decoded: Hypercube<i32, i32> =
            read_space(&mut wire.as_slice()).expect("the wire data is valid");
        assert_eq!(cube, decoded);
        assert_eq!("prices", decoded.name());
        assert_eq!("price_table", decoded.relation());
    }

    #[test]
    fn a_wrong_value_type_is_rejected() {
        let cube = two_var_cube();
        let mut wire = Vec::new();
        write_space(&cube, &mut wire).expect("writing to a vec cannot fail");

        let error = read_space::<i64, i32>(&mut wire.as_slice())
            .expect_err("the domain value tag does not match");
        assert!(matches!(
            error,
            CodecError::TypeMismatch {
                expected: TypeTag::I64,
                found: TypeTag::I32,
            }
        ));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let cube = two_var_cube();
        let mut wire = Vec::new();
        write_space(&cube, &mut wire).expect("writing to a vec cannot fail");
        wire.truncate(wire.len() - 3);

        let error = read_space::<i32, i32>(&mut wire.as_slice()).expect_err("input is truncated");
        assert!(matches!(error, CodecError::Io(_)));
    }

    #[test]
    fn serialising_counts_one_check_per_utility() {
        use crate::statistics::CheckCounter;

        let mut cube = two_var_cube();
        let checks = CheckCounter::new();
        cube.attach_checks(checks.clone());

        let mut wire = Vec::new();
        write_space(&cube, &mut wire).expect("writing to a vec cannot fail");
        assert_eq!(4, checks.count());
    }
}
