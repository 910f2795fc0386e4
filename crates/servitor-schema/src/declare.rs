//! Declared types for native Rust types.
//!
//! [`Declare`] lets callers write `Vec::<String>::declared_type()` instead
//! of assembling the equivalent [`DeclaredType`] by hand.  Records have no
//! blanket implementation; build them with [`crate::Record`].

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;

use crate::types::DeclaredType;

/// A Rust type with a known [`DeclaredType`].
pub trait Declare {
    fn declared_type() -> DeclaredType;
}

macro_rules! declare_as {
    ($ctor:ident: $($ty:ty),+ $(,)?) => {
        $(
            impl Declare for $ty {
                fn declared_type() -> DeclaredType {
                    DeclaredType::$ctor()
                }
            }
        )+
    };
}

declare_as!(string: String, &str, char);
declare_as!(integer: i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
declare_as!(float: f32, f64);
declare_as!(boolean: bool);
declare_as!(null: ());

impl Declare for Value {
    fn declared_type() -> DeclaredType {
        DeclaredType::Any
    }
}

impl<T: Declare> Declare for Option<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::optional(T::declared_type())
    }
}

impl<T: Declare> Declare for Vec<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::list(T::declared_type())
    }
}

impl<T: Declare> Declare for HashSet<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::set(T::declared_type())
    }
}

impl<T: Declare> Declare for BTreeSet<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::set(T::declared_type())
    }
}

macro_rules! declare_tuple {
    ($($name:ident),+) => {
        impl<$($name: Declare),+> Declare for ($($name,)+) {
            fn declared_type() -> DeclaredType {
                DeclaredType::tuple([$($name::declared_type()),+])
            }
        }
    };
}

declare_tuple!(A);
declare_tuple!(A, B);
declare_tuple!(A, B, C);
declare_tuple!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render_type;

    #[test]
    fn scalars() {
        assert_eq!(String::declared_type(), DeclaredType::string());
        assert_eq!(u16::declared_type(), DeclaredType::integer());
        assert_eq!(f32::declared_type(), DeclaredType::float());
        assert_eq!(<()>::declared_type(), DeclaredType::null());
        assert!(Value::declared_type().is_any());
    }

    #[test]
    fn composites_render_like_hand_built_types() {
        assert_eq!(render_type(&Vec::<Option<i64>>::declared_type()), "[int?]");
        assert_eq!(render_type(&HashSet::<String>::declared_type()), "{string}");
        assert_eq!(
            render_type(&<(String, bool, f64)>::declared_type()),
            "(string, bool, float)"
        );
        assert_eq!(render_type(&<(u8,)>::declared_type()), "(int,)");
    }
}
