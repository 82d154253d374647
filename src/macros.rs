/// Helper macro for locking items, propagating a poisoned lock as [`Error::LockError`]
///
/// ```rust, ignore
///  let mut domain = lock!(self.domain)?;
///  domain.heap.clear();
/// ```
///
/// [`Error::LockError`]: crate::Error::LockError
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)
    };
}

/// Generates a typed table of resolved methods.
///
/// Each entry names the struct field, the method descriptor as the engine declares it and the
/// expected return type. The generated struct gets a `resolve` constructor that resolves every
/// entry once against a type, a `SIGNATURES` table for diagnostics and by-name lookup through
/// `get`.
///
/// ```rust, ignore
/// method_table! {
///     /// Operations on `Command` objects.
///     pub struct CommandMethods {
///         get_name => "GetName()" -> "string",
///     }
/// }
/// ```
macro_rules! method_table {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident => $sig:literal -> $ret:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: crate::runtime::MethodRef,
            )*
        }

        impl $name {
            /// Logical name, descriptor and return type of every entry, in declaration order.
            pub const SIGNATURES: &'static [(&'static str, &'static str, &'static str)] = &[
                $((stringify!($field), $sig, $ret)),*
            ];

            /// Resolves every entry against `ty`.
            ///
            /// # Errors
            ///
            /// Returns [`crate::Error::MethodNotFound`] for the first entry that does not
            /// resolve and [`crate::Error::InvalidSignature`] for a malformed return type.
            pub fn resolve(
                env: &crate::runtime::Environment,
                ty: &crate::runtime::TypeRef,
            ) -> crate::Result<Self> {
                Ok($name {
                    $(
                        $field: crate::runtime::resolve_method_returning(
                            env,
                            ty,
                            $sig,
                            &$ret.parse::<crate::runtime::ValueType>()?,
                        )?,
                    )*
                })
            }

            /// Number of entries in the table.
            #[must_use]
            pub const fn len() -> usize {
                Self::SIGNATURES.len()
            }

            /// Looks up a resolved method by its logical name.
            #[must_use]
            pub fn get(&self, logical_name: &str) -> Option<&crate::runtime::MethodRef> {
                match logical_name {
                    $(stringify!($field) => Some(&self.$field),)*
                    _ => None,
                }
            }
        }
    };
}
