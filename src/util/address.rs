use bytemuck::NoUninit;

use std::fmt;
use std::mem;
use std::num::NonZeroUsize;
use std::ops::*;

/// size in bytes
pub type ByteSize = usize;

/// Address represents an arbitrary address. This is designed to represent
/// address and do address arithmetic mostly in a safe way, and to allow
/// marking some operations as unsafe. This type needs to be zero overhead
/// (memory wise and time wise).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq, NoUninit)]
pub struct Address(usize);

assert_eq_size!(Address, usize);

/// Address + ByteSize (positive)
impl Add<ByteSize> for Address {
    type Output = Address;
    fn add(self, offset: ByteSize) -> Address {
        Address(self.0 + offset)
    }
}

/// Address - Address (the first address must be higher)
impl Sub<Address> for Address {
    type Output = ByteSize;
    fn sub(self, other: Address) -> ByteSize {
        debug_assert!(
            self.0 >= other.0,
            "for (addr_a - addr_b), a({}) needs to be larger than b({})",
            self,
            other
        );
        self.0 - other.0
    }
}

impl Address {
    /// The zero address.
    pub const ZERO: Self = Address(0);

    /// Create an Address from a raw usize value.
    ///
    /// # Safety
    ///
    /// The caller must be aware that dereferencing an arbitrary usize as an
    /// address is never safe; this constructor itself is marked unsafe to
    /// discourage casual conversions.
    pub const unsafe fn from_usize(raw: usize) -> Address {
        Address(raw)
    }

    /// Create an Address from a mutable pointer.
    pub fn from_mut_ptr<T>(ptr: *mut T) -> Address {
        Address(ptr as usize)
    }

    /// Get the raw usize value of this address.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Is this address zero?
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Convert this address to a const pointer.
    pub fn to_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    /// Convert this address to a mutable pointer.
    pub fn to_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// `ObjectReference` represents a managed object known to be valid, i.e. an
/// object the allocator has produced and not yet reclaimed.  It is a non-null
/// address, so `Option<ObjectReference>` is the same size as a word.
///
/// PMCS never dereferences an `ObjectReference` itself; all per-object
/// operations (the mark byte, the size, field enumeration) go through the
/// binding's [`crate::vm::ObjectModel`] and [`crate::vm::Scanning`].
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq)]
pub struct ObjectReference(NonZeroUsize);

assert_eq_size!(ObjectReference, usize);
assert_eq_size!(Option<ObjectReference>, usize);

impl ObjectReference {
    /// Convert a raw address to an `ObjectReference`.  Returns `None` for the
    /// zero address.  The caller is responsible for only converting addresses
    /// that actually refer to live objects.
    pub fn from_raw_address(addr: Address) -> Option<ObjectReference> {
        NonZeroUsize::new(addr.0).map(ObjectReference)
    }

    /// Like `from_raw_address`, but the caller guarantees the address is not
    /// zero.
    ///
    /// # Safety
    ///
    /// `addr` must not be zero.
    pub unsafe fn from_raw_address_unchecked(addr: Address) -> ObjectReference {
        debug_assert!(!addr.is_zero());
        ObjectReference(NonZeroUsize::new_unchecked(addr.0))
    }

    /// Get the raw address of this object reference.
    pub fn to_raw_address(self) -> Address {
        Address(self.0.get())
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// `Address` is stored in `atomic::Atomic` cells (weak-reference slots); make
// sure that is actually lock-free on this platform.
const _: () = assert!(mem::size_of::<Address>() == mem::size_of::<usize>());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_arithmetic() {
        let a = unsafe { Address::from_usize(0x1000) };
        assert_eq!(a + 8usize, unsafe { Address::from_usize(0x1008) });
        assert_eq!((a + 8usize) - a, 8);
        assert!(!a.is_zero());
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn object_reference_from_address() {
        assert!(ObjectReference::from_raw_address(Address::ZERO).is_none());
        let a = unsafe { Address::from_usize(0x1000) };
        let o = ObjectReference::from_raw_address(a).unwrap();
        assert_eq!(o.to_raw_address(), a);
    }
}
