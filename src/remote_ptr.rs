use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result},
    marker::PhantomData,
    ops::{Add, Sub},
};

/// Useful alias.
pub type Void = u8;

/// An address in the debuggee's address space.
#[derive(Hash, Debug)]
/// Manually derive Copy, Clone due to quirks with PhantomData
pub struct RemotePtr<T> {
    ptr: usize,
    phantom: PhantomData<*const T>,
}

impl<T> Clone for RemotePtr<T> {
    fn clone(&self) -> Self {
        RemotePtr {
            ptr: self.ptr,
            phantom: PhantomData,
        }
    }
}

impl<T> Copy for RemotePtr<T> {}

impl<T> Default for RemotePtr<T> {
    fn default() -> Self {
        RemotePtr::null()
    }
}

impl<T> RemotePtr<T> {
    pub fn null() -> RemotePtr<T> {
        RemotePtr {
            ptr: 0,
            phantom: PhantomData,
        }
    }

    pub fn new_from_val(val: usize) -> RemotePtr<T> {
        RemotePtr {
            ptr: val,
            phantom: PhantomData,
        }
    }

    pub fn as_usize(&self) -> usize {
        self.ptr
    }

    /// The address as the 64-bit quantity the debug-register ABIs use.
    pub fn as_u64(&self) -> u64 {
        self.ptr as u64
    }

    pub fn is_null(&self) -> bool {
        self.ptr == 0
    }

    pub fn referent_size(&self) -> usize {
        std::mem::size_of::<T>()
    }
}

impl<T> Display for RemotePtr<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:#x}", self.ptr)
    }
}

impl<T> Add<usize> for RemotePtr<T> {
    type Output = Self;

    fn add(self, delta: usize) -> Self::Output {
        // Will automatically deal with overflow in debug mode.
        let result: usize = self.as_usize() + delta * std::mem::size_of::<T>();
        Self::new_from_val(result)
    }
}

impl<T> Sub<usize> for RemotePtr<T> {
    type Output = Self;

    fn sub(self, delta: usize) -> Self::Output {
        // Will automatically deal with underflow in debug mode.
        let result: usize = self.as_usize() - delta * std::mem::size_of::<T>();
        Self::new_from_val(result)
    }
}

impl<T> From<usize> for RemotePtr<T> {
    fn from(addr: usize) -> Self {
        RemotePtr::new_from_val(addr)
    }
}

impl<T> PartialEq for RemotePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for RemotePtr<T> {}

impl<T> PartialOrd for RemotePtr<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for RemotePtr<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ptr.cmp(&other.ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sub_void() {
        let a = RemotePtr::<Void>::new_from_val(0x1000);
        let b = a + 8usize;
        assert_eq!(0x1008, b.as_usize());
        assert_eq!(a, b - 8usize);
    }

    #[test]
    fn add_test_with_custom_struct() {
        struct S(u64, u64);
        let a = RemotePtr::<S>::null();
        let b = a + 1usize;
        assert_eq!(16, b.as_usize());
    }

    #[test]
    fn display_and_compare() {
        let b = RemotePtr::<Void>::new_from_val(8);
        assert_eq!(1, b.referent_size());
        assert!(RemotePtr::<Void>::null() < b);
        assert_eq!(format!("{}", b), "0x8");
    }
}
