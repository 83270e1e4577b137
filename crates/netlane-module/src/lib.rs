//! # netlane-module — Default implementations of netlane-core traits
//!
//! - `PooledBuffers`: concurrent free-list `BufferProvider` (default)
//! - `HeapBuffers`: non-pooling `BufferProvider`
//! - `LengthPrefixCodec`: reference `Decoder` + `Encoder`
//! - `EpollPoller`: epoll `Poller` with an eventfd waker (Linux)
//! - `sys`: thin libc wrappers shared by the server

pub mod heap_buffers;
pub mod length_prefix;
pub mod pooled_buffers;
pub mod sys;

pub use heap_buffers::HeapBuffers;
pub use length_prefix::LengthPrefixCodec;
pub use pooled_buffers::PooledBuffers;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod epoll_poller;
        mod eventfd_waker;

        pub use epoll_poller::EpollPoller;

        /// Poller backend selected for this target.
        pub type DefaultPoller = EpollPoller;
    } else {
        compile_error!("netlane needs an epoll-capable target (Linux)");
    }
}
