use crate::util::Address;
use libc::c_void;

/// An opaque pointer handed to PMCS by the VM.  PMCS does not provide any
/// method for dereferencing it; the binding may transmute it back to whatever
/// thread-local structure it identifies.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OpaquePointer(*mut c_void);

// PMCS never dereferences an opaque pointer.
unsafe impl Sync for OpaquePointer {}
unsafe impl Send for OpaquePointer {}

impl Default for OpaquePointer {
    fn default() -> Self {
        Self::UNINITIALIZED
    }
}

impl OpaquePointer {
    /// An uninitialized (null) opaque pointer.
    pub const UNINITIALIZED: Self = Self(std::ptr::null_mut());

    /// Create an opaque pointer from an address.
    pub fn from_address(addr: Address) -> Self {
        OpaquePointer(addr.to_mut_ptr::<c_void>())
    }

    /// Get the address value of this opaque pointer.
    pub fn to_address(self) -> Address {
        Address::from_mut_ptr(self.0)
    }

    /// Is this pointer null?
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// A `VMThread` is an opaque pointer that can uniquely identify any thread in
/// the VM, mutator or not.  The binding may use thread pointers or thread IDs
/// as `VMThread`s; PMCS makes no assumption about the value, it only stores it
/// and passes it back through the `vm` traits.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VMThread(pub OpaquePointer);

impl VMThread {
    /// An uninitialized thread pointer.
    pub const UNINITIALIZED: Self = Self(OpaquePointer::UNINITIALIZED);
}

/// A `VMMutatorThread` is a `VMThread` known to identify a registered mutator.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VMMutatorThread(pub VMThread);

/// A `VMWorkerThread` is a `VMThread` known to identify a GC thread (the
/// controller, an auxiliary mark worker, or the finalizer thread).  GC threads
/// are never registered mutators and are never subject to a stop-the-world
/// request.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VMWorkerThread(pub VMThread);
