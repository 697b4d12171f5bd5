use crate::error::BufferError;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr::{self, NonNull};

/// Allocation granularity for mirrored mappings
///
/// Wraps sysconf(_SC_PAGESIZE); falls back to 4096 if the query fails
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// Create a pipe for one child output stream
///
/// Returns (read end, write end). Both ends are close-on-exec: the child
/// only sees the write end through the dup2 done by `Command`. The read end
/// is non-blocking so the drain loop never parks on an empty pipe.
pub fn create_output_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let (read_end, write_end) = raw_pipe()?;
    set_nonblocking(read_end.as_raw_fd())?;
    Ok((read_end, write_end))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn raw_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1, -1];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // Ownership moves into OwnedFd; both are closed on every later error path
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn raw_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1, -1];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let pair = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    set_cloexec(pair.0.as_raw_fd())?;
    set_cloexec(pair.1.as_raw_fd())?;
    Ok(pair)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Put a descriptor into non-blocking mode
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Two adjacent virtual ranges of `len` bytes backed by the same pages
///
/// Byte `i` and byte `i + len` are the same memory for every `i < len`, so a
/// window of up to `len` bytes starting anywhere in the first range is
/// contiguous.
pub struct MirroredMapping {
    base: NonNull<u8>,
    len: usize,
}

// The mapping is plain shared memory; synchronisation is the owner's job
unsafe impl Send for MirroredMapping {}
unsafe impl Sync for MirroredMapping {}

impl MirroredMapping {
    pub fn new(len: usize) -> Result<Self, BufferError> {
        if len == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        let granularity = page_size();
        if len % granularity != 0 {
            return Err(BufferError::UnalignedCapacity {
                capacity: len,
                granularity,
            });
        }

        let backing = anonymous_backing().map_err(|source| BufferError::Map {
            step: "create backing object",
            source,
        })?;
        if unsafe { libc::ftruncate(backing.as_raw_fd(), len as libc::off_t) } != 0 {
            return Err(BufferError::Map {
                step: "size backing object",
                source: io::Error::last_os_error(),
            });
        }

        // Reserve 2*len of address space first so both views land adjacent
        let reservation = Reservation::new(2 * len).map_err(|source| BufferError::Map {
            step: "reserve address range",
            source,
        })?;

        for (step, offset) in [("map primary view", 0), ("map mirror view", len)] {
            let target = unsafe { reservation.base.as_ptr().add(offset) };
            map_fixed_shared(target, len, backing.as_raw_fd())
                .map_err(|source| BufferError::Map { step, source })?;
        }

        // The views keep the backing object alive; the descriptor can go
        drop(backing);
        Ok(Self {
            base: reservation.into_inner(),
            len,
        })
    }

    /// Length of one view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Start of the primary view; valid for `2 * len` bytes.
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }
}

impl Drop for MirroredMapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), 2 * self.len);
        }
    }
}

/// PROT_NONE address reservation, released on drop unless taken over
struct Reservation {
    base: NonNull<u8>,
    len: usize,
}

impl Reservation {
    fn new(len: usize) -> io::Result<Self> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null reservation"))?;
        Ok(Self { base, len })
    }

    fn into_inner(self) -> NonNull<u8> {
        let base = self.base;
        std::mem::forget(self);
        base
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        // Also tears down any view already mapped over part of the range
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.len);
        }
    }
}

fn map_fixed_shared(target: *mut u8, len: usize, fd: RawFd) -> io::Result<()> {
    let addr = unsafe {
        libc::mmap(
            target.cast(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_FIXED,
            fd,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    if addr.cast::<u8>() != target {
        return Err(io::Error::other("kernel placed view at an unexpected address"));
    }
    Ok(())
}

/// Anonymous shared-memory object backing both views
#[cfg(any(target_os = "linux", target_os = "android"))]
fn anonymous_backing() -> io::Result<OwnedFd> {
    let fd = unsafe { libc::memfd_create(c"app-warden-output".as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Anonymous shared-memory object backing both views
///
/// No memfd here: create a uniquely named POSIX object and unlink it at once
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn anonymous_backing() -> io::Result<OwnedFd> {
    use std::ffi::CString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SEQ: AtomicUsize = AtomicUsize::new(0);

    // shm_open is variadic on Apple targets
    #[cfg(target_vendor = "apple")]
    const SHM_MODE: libc::c_uint = 0o600;
    #[cfg(not(target_vendor = "apple"))]
    const SHM_MODE: libc::mode_t = 0o600;

    let name = format!(
        "/apw-{}-{}",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    );
    let name = CString::new(name).map_err(io::Error::other)?;
    let fd = unsafe {
        libc::shm_open(
            name.as_ptr(),
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            SHM_MODE,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    unsafe {
        libc::shm_unlink(name.as_ptr());
    }
    Ok(owned)
}
