/*!
    half-duplex master/slave fieldbus running over a shared RS-485 uart line

    every frame on the line is `[address][payload][checksum]`, frames are delimited by line silence rather than by length fields.

    - [master] (feature `master`) serializes access to the line, retries and tracks failing devices
    - [slave] (feature `slave`) accumulates bytes from interrupts, filters frames by address and answers through a worker task
*/
#![no_std]
#[cfg(any(feature = "std", test))]
extern crate std;

#[cfg(feature = "slave")]
mod mutex;

pub mod checksum;
pub mod packet;
pub mod timing;
pub mod transport;
#[cfg(feature = "master")]
pub mod master;
#[cfg(feature = "slave")]
pub mod slave;

pub use checksum::ChecksumKind;
pub use packet::{Address, AddressWidth, Format};
