/// Define a transparent id newtype over a primitive integer.
///
/// Ids travel through file names, persisted JSON metadata and log fields,
/// so the wrapper must keep the primitive's exact representation:
/// `#[repr(transparent)]`, transparent serde, and `Display` as the bare
/// number. Each kind of id still gets its own type, so a chunk id cannot be
/// passed where some other counter is expected. The full comparison,
/// hashing and `Default` surface comes along so ids can key maps and sets
/// directly.
#[macro_export]
macro_rules! strong_type {
    ($name:ident, $inner:ty) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Unwrap to the primitive value.
            #[inline]
            pub const fn raw(self) -> $inner {
                self.0
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = $inner;

            #[inline]
            fn deref(&self) -> &$inner {
                &self.0
            }
        }

        impl ::std::convert::From<$inner> for $name {
            #[inline]
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl ::std::convert::From<$name> for $inner {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0).finish()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    strong_type!(TestId, u64);

    #[test]
    fn test_wraps_and_unwraps() {
        let id = TestId(42);
        assert_eq!(id.0, 42);
        assert_eq!(*id, 42u64);
        assert_eq!(id.raw(), 42);
    }

    #[test]
    fn test_from_both_directions() {
        let id: TestId = 100u64.into();
        assert_eq!(id, TestId(100));

        let raw: u64 = id.into();
        assert_eq!(raw, 100);
    }

    #[test]
    fn test_display_is_the_bare_number() {
        let id = TestId(7);
        assert_eq!(format!("{}", id), "7");
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn test_debug_names_the_type() {
        assert_eq!(format!("{:?}", TestId(7)), "TestId(7)");
    }

    #[test]
    fn test_ordering() {
        let a = TestId(1);
        let b = TestId(2);
        assert!(a < b);
        assert_eq!(a, TestId(1));
        assert_ne!(a, b);
    }

    #[test]
    fn test_usable_as_set_key() {
        let mut set = HashSet::new();
        set.insert(TestId(1));
        set.insert(TestId(2));
        set.insert(TestId(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_default_is_zero() {
        assert_eq!(TestId::default(), TestId(0));
        assert_eq!(TestId::default().raw(), 0);
    }

    #[test]
    fn test_copy_semantics() {
        let a = TestId(5);
        let b = a;
        // `a` is still usable after the copy.
        assert_eq!(a, b);
        assert_eq!(a.raw(), b.raw());
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = TestId(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");
        let parsed: TestId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
