use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::{
    error::{DatagenError, Result},
    types::CType,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Value {
    Scalar(i64),
    Array(Vec<i64>),
}

/// One typed C variable definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Declaration {
    ctype: CType,
    name: String,
    value: Value,
}

fn check_range(ctype: CType, name: &str, value: i64) -> Result<()> {
    if !ctype.fits(value) {
        return Err(DatagenError::config(
            name,
            format!("{value} does not fit in {ctype}"),
        ));
    }
    Ok(())
}

impl Declaration {
    pub fn scalar(ctype: CType, name: impl Into<String>, value: i64) -> Result<Self> {
        let name = name.into();
        check_range(ctype, &name, value)?;
        Ok(Self {
            ctype,
            name,
            value: Value::Scalar(value),
        })
    }

    pub fn array(ctype: CType, name: impl Into<String>, values: Vec<i64>) -> Result<Self> {
        let name = name.into();
        if values.is_empty() {
            return Err(DatagenError::config(name, "arrays cannot be empty in C"));
        }
        values
            .iter()
            .try_for_each(|v| check_range(ctype, &name, *v))?;
        Ok(Self {
            ctype,
            name,
            value: Value::Array(values),
        })
    }

    pub fn ctype(&self) -> CType {
        self.ctype
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Display for Declaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Value::Scalar(v) => write!(f, "{} {} = {};", self.ctype, self.name, v),
            Value::Array(values) => {
                write!(f, "{} {}[] = {{ ", self.ctype, self.name)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(" };")
            }
        }
    }
}
