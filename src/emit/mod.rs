//! C header emission.
//!
//! Declarations are accumulated in a [HeaderBuilder] in two sections: parameters (scalars, descriptors, addresses)
//! come first, then the data arrays. [HeaderBuilder::finish] renders the header text.

mod declaration;

pub use declaration::{Declaration, Value};

use rustc_hash::FxHashSet;

use crate::{
    error::{DatagenError, Result},
    types::{CType, StaticallySized},
};

pub const HEADER_PRELUDE: &str = "#include <stdint.h>\n";

fn widen<T: TryInto<i64>>(name: &str, value: T) -> Result<i64> {
    value
        .try_into()
        .map_err(|_| DatagenError::config(name, "value does not fit in 64 bits"))
}

fn widen_all<T: TryInto<i64>>(name: &str, values: impl IntoIterator<Item = T>) -> Result<Vec<i64>> {
    values.into_iter().map(|v| widen(name, v)).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Params,
    Data,
}

#[derive(Clone, Debug, Default)]
pub struct HeaderBuilder {
    params: Vec<Declaration>,
    data: Vec<Declaration>,
    names: FxHashSet<String>,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, section: Section, declaration: Declaration) -> Result<&mut Self> {
        if !self.names.insert(declaration.name().to_string()) {
            return Err(DatagenError::config(
                declaration.name(),
                "declared twice in the same header",
            ));
        }
        match section {
            Section::Params => self.params.push(declaration),
            Section::Data => self.data.push(declaration),
        }
        Ok(self)
    }

    pub fn scalar<T: TryInto<i64>>(
        &mut self,
        ctype: CType,
        name: impl Into<String>,
        value: T,
    ) -> Result<&mut Self> {
        let name = name.into();
        let value = widen(&name, value)?;
        self.push(Section::Params, Declaration::scalar(ctype, name, value)?)
    }

    /// A parameter array, e.g. loop bounds or CSR words.
    pub fn param_array<T: TryInto<i64>>(
        &mut self,
        ctype: CType,
        name: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Result<&mut Self> {
        let name = name.into();
        let values = widen_all(&name, values)?;
        self.push(Section::Params, Declaration::array(ctype, name, values)?)
    }

    pub fn data_array<T: TryInto<i64>>(
        &mut self,
        ctype: CType,
        name: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Result<&mut Self> {
        let name = name.into();
        let values = widen_all(&name, values)?;
        self.push(Section::Data, Declaration::array(ctype, name, values)?)
    }

    /// A data array whose C type follows the Rust element type.
    pub fn tensor<T: StaticallySized>(
        &mut self,
        name: impl Into<String>,
        values: &[T],
    ) -> Result<&mut Self> {
        self.data_array(T::CTYPE, name, values.iter().copied())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.params.iter().chain(self.data.iter())
    }

    pub fn len(&self) -> usize {
        self.params.len() + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the header: the prelude, every parameter, then every data array, in insertion order.
    pub fn finish(self) -> String {
        let mut lines = vec![HEADER_PRELUDE.to_string()];
        lines.extend(self.declarations().map(|d| d.to_string()));
        lines.join("\n") + "\n"
    }
}

#[cfg(test)]
mod tests {
    use crate::types::CType;

    use super::HeaderBuilder;

    #[test]
    fn params_precede_data() {
        let mut header = HeaderBuilder::new();
        header
            .data_array(CType::Int8, "A", [1i8, -2])
            .unwrap()
            .scalar(CType::UInt32, "M", 4u32)
            .unwrap();
        header.tensor("D", &[7i32]).unwrap();
        assert_eq!(
            header.finish(),
            "#include <stdint.h>\n\nuint32_t M = 4;\nint8_t A[] = { 1, -2 };\nint32_t D[] = { 7 };\n"
        );
    }

    #[test]
    fn names_are_unique() {
        let mut header = HeaderBuilder::new();
        header.scalar(CType::UInt32, "M", 4u32).unwrap();
        assert!(header.scalar(CType::UInt32, "M", 5u32).is_err());
        assert_eq!(header.len(), 1);
    }
}
