//! SharedMemoryRegion - POSIX shared memory wrapper.
//!
//! Provides safe abstraction over mmap and shm_open for the event store.
//! All unsafe operations are encapsulated with bounds checking.

use std::ffi::CString;
use std::ptr::NonNull;

use crate::error::SharedMemoryError;

/// How a region was mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapAccess {
    /// Created by this process, mapped read-write; unlinked on drop.
    Owner,
    /// Opened from an existing segment, mapped read-only.
    ReadOnly,
}

/// Represents a mapped shared memory region.
///
/// This struct owns the mapping and will unmap it on drop. The owner also
/// unlinks the name so that a later service instance starts from scratch.
pub struct SharedMemoryRegion {
    /// Name of the shared memory object (without the leading slash).
    name: String,
    /// Pointer to the mapped memory.
    ptr: NonNull<u8>,
    /// Size of the mapped region in bytes.
    size: usize,
    /// File descriptor for the shared memory object.
    fd: i32,
    access: MapAccess,
}

// SAFETY: SharedMemoryRegion owns its mapping; moving it between threads is fine.
unsafe impl Send for SharedMemoryRegion {}

// SAFETY: the region only hands out raw pointers; all access to the event
// store layout goes through atomics.
unsafe impl Sync for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// Minimum size for a shared memory region.
    pub const MIN_SIZE: usize = 4096;

    /// Maximum size for a shared memory region (16 MB).
    pub const MAX_SIZE: usize = 16 * 1024 * 1024;

    /// Create a new shared memory region, zero-filled.
    ///
    /// A leftover segment with the same name (a service that crashed before
    /// cleanup) is unlinked and creation retried once. Callers must rule out
    /// a live owner first.
    ///
    /// # Errors
    /// Returns SharedMemoryError if creation or mapping fails.
    pub fn create(name: &str, size: usize) -> Result<Self, SharedMemoryError> {
        Self::check_size(name, size)?;
        let c_name = Self::c_name(name)?;

        let fd = match Self::shm_open_exclusive(&c_name) {
            Ok(fd) => fd,
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                tracing::warn!(name = %name, "Unlinking stale shared memory region");
                // SAFETY: c_name is a valid CString
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                Self::shm_open_exclusive(&c_name).map_err(|e| {
                    SharedMemoryError::CreateFailed {
                        name: name.to_string(),
                        reason: format!("shm_open failed after unlinking stale region: {}", e),
                    }
                })?
            }
            Err(e) => {
                return Err(SharedMemoryError::CreateFailed {
                    name: name.to_string(),
                    reason: format!("shm_open failed: {}", e),
                })
            }
        };

        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", errno),
            });
        }

        let ptr = match Self::map(fd, size, libc::PROT_READ | libc::PROT_WRITE) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                return Err(e);
            }
        };

        // SAFETY: ptr is valid for size bytes and nobody else has seen it yet
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, size);
        }

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            fd,
            access: MapAccess::Owner,
        })
    }

    /// Open an existing shared memory region read-only.
    pub fn open_read_only(name: &str, size: usize) -> Result<Self, SharedMemoryError> {
        Self::check_size(name, size)?;
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd < 0 {
            return Err(SharedMemoryError::OpenFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        // A segment shorter than the layout would fault on access instead of
        // failing cleanly, so check before mapping.
        // SAFETY: fd is valid, stat is plain old data
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut stat) } < 0 || (stat.st_size as usize) < size {
            unsafe { libc::close(fd) };
            return Err(SharedMemoryError::OpenFailed {
                name: name.to_string(),
                reason: format!("segment is {} bytes, expected {}", stat.st_size, size),
            });
        }

        let ptr = match Self::map(fd, size, libc::PROT_READ) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Opened shared memory region read-only");

        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            fd,
            access: MapAccess::ReadOnly,
        })
    }

    fn check_size(name: &str, size: usize) -> Result<(), SharedMemoryError> {
        if name.is_empty() {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: "Name cannot be empty".to_string(),
            });
        }
        if !(Self::MIN_SIZE..=Self::MAX_SIZE).contains(&size) {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!(
                    "Size {} outside [{}, {}]",
                    size,
                    Self::MIN_SIZE,
                    Self::MAX_SIZE
                ),
            });
        }
        Ok(())
    }

    fn c_name(name: &str) -> Result<CString, SharedMemoryError> {
        CString::new(format!("/{}", name)).map_err(|e| SharedMemoryError::CreateFailed {
            name: name.to_string(),
            reason: format!("Invalid name: {}", e),
        })
    }

    fn shm_open_exclusive(c_name: &CString) -> std::io::Result<i32> {
        // SAFETY: c_name is a valid CString, flags are valid POSIX flags
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o644,
            )
        };
        if fd < 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(fd)
        }
    }

    fn map(fd: i32, size: usize, prot: libc::c_int) -> Result<NonNull<u8>, SharedMemoryError> {
        // SAFETY: fd is valid, size is validated, offset 0 is valid
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                prot,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(SharedMemoryError::MapFailed {
                reason: format!("mmap failed: {}", std::io::Error::last_os_error()),
            });
        }

        NonNull::new(ptr as *mut u8).ok_or_else(|| SharedMemoryError::MapFailed {
            reason: "mmap returned null".to_string(),
        })
    }

    /// Get the name of this shared memory region.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size of this shared memory region.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn access(&self) -> MapAccess {
        self.access
    }

    /// Raw pointer to the start of the mapping.
    ///
    /// Writing through it is only valid for [`MapAccess::Owner`] regions.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and size were set during creation
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) };
        if result < 0 {
            tracing::error!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }

        // SAFETY: fd was opened during creation
        unsafe { libc::close(self.fd) };

        if self.access == MapAccess::Owner {
            if let Ok(c_name) = Self::c_name(&self.name) {
                // SAFETY: c_name is a valid CString
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                tracing::debug!(name = %self.name, "Unlinked shared memory region");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("gpiocast-region-{}-{}", tag, std::process::id())
    }

    #[test]
    fn test_shm_size_validation() {
        assert!(SharedMemoryRegion::create(&unique_name("small"), 100).is_err());
        assert!(SharedMemoryRegion::create(
            &unique_name("large"),
            SharedMemoryRegion::MAX_SIZE + 1
        )
        .is_err());
    }

    #[test]
    fn test_shm_empty_name() {
        assert!(SharedMemoryRegion::create("", 4096).is_err());
    }

    #[test]
    fn test_open_missing_region() {
        let err = SharedMemoryRegion::open_read_only(&unique_name("missing"), 4096)
            .err()
            .unwrap();
        assert!(err.is_absent_service());
    }

    #[test]
    fn test_owner_and_reader_share_bytes() {
        let name = unique_name("shared");
        let owner = SharedMemoryRegion::create(&name, 4096).unwrap();
        assert_eq!(owner.access(), MapAccess::Owner);

        // SAFETY: owner mapping is writable and 4096 bytes long
        unsafe { owner.as_ptr().add(10).write(0xAB) };

        let reader = SharedMemoryRegion::open_read_only(&name, 4096).unwrap();
        assert_eq!(reader.access(), MapAccess::ReadOnly);
        // SAFETY: reader mapping is readable and 4096 bytes long
        assert_eq!(unsafe { reader.as_ptr().add(10).read() }, 0xAB);

        drop(reader);
        drop(owner);
        assert!(SharedMemoryRegion::open_read_only(&name, 4096).is_err());
    }

    #[test]
    fn test_create_replaces_stale_region() {
        let name = unique_name("stale");
        let first = SharedMemoryRegion::create(&name, 4096).unwrap();
        // Simulate a crashed owner: the segment outlives its creator
        std::mem::forget(first);

        let second = SharedMemoryRegion::create(&name, 4096).unwrap();
        // SAFETY: freshly created mapping of 4096 bytes
        assert_eq!(unsafe { second.as_ptr().read() }, 0);
    }
}
