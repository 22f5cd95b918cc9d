// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Storage seen by the engine: one linear, whole-chip-erasable byte space.

/// Linear byte storage holding at most one configuration image at offset 0.
pub trait FlashStore {
    type Error;

    /// Fill `buf` with the bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Program `data` at `addr`. The target range must be erased.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Erase the whole device. May block for a long time.
    fn erase_all(&mut self) -> Result<(), Self::Error>;
}

impl<T: FlashStore + ?Sized> FlashStore for &mut T {
    type Error = T::Error;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write(addr, data)
    }

    fn erase_all(&mut self) -> Result<(), Self::Error> {
        (**self).erase_all()
    }
}
