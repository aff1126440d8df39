//! Member namespaces.

/// Namespace a class member lives in.
///
/// The ordinal is total and dense; the optimizer indexes per-class namespace
/// arrays with it, so the variant order is part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberNamespace {
    /// Publicly dispatchable instance members. For interfaces these are the
    /// default methods.
    PublicInstance,
    /// Private instance members, statically resolved.
    PrivateInstance,
    PublicStatic,
    PrivateStatic,
    Constructor,
    StaticConstructor,
}

impl MemberNamespace {
    /// Number of namespaces; the size of every per-class namespace array.
    pub const COUNT: usize = 6;

    pub const ALL: [MemberNamespace; MemberNamespace::COUNT] = [
        MemberNamespace::PublicInstance,
        MemberNamespace::PrivateInstance,
        MemberNamespace::PublicStatic,
        MemberNamespace::PrivateStatic,
        MemberNamespace::Constructor,
        MemberNamespace::StaticConstructor,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn from_ordinal(ordinal: usize) -> MemberNamespace {
        MemberNamespace::ALL[ordinal]
    }

    /// Whether members of this namespace receive a `this` value.
    pub fn has_this(self) -> bool {
        matches!(
            self,
            MemberNamespace::PublicInstance
                | MemberNamespace::PrivateInstance
                | MemberNamespace::Constructor
        )
    }

    pub fn is_constructor(self) -> bool {
        self == MemberNamespace::Constructor
    }

    pub fn is_static(self) -> bool {
        matches!(
            self,
            MemberNamespace::PublicStatic
                | MemberNamespace::PrivateStatic
                | MemberNamespace::StaticConstructor
        )
    }
}
