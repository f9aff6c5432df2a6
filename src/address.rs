// The kernel virtual address range [0xffffffffc0000000, 0xffffffffffffffff]
// maps to the physical address range [0, 0x3fffffff]. Everything below that
// range belongs to user space (TTBR0).
const ADDRESS_SPACE_SIZE: u64 = 1 << 30;
const _HIGH_MEMORY_START: u64 = 0xFFFF_FFFF_C000_0000;
const VC_MMU_RAM_RANGE: core::ops::RangeInclusive<u32> = 0xC000_0000..=0xFEFF_FFFF;
const VC_MMU_PERIPHERALS_RANGE: core::ops::RangeInclusive<u32> = 0x7E00_0000..=0x7EFF_FFFF;

pub const PERIPHERALS_PHYS: AddressPhysical = AddressPhysical::new(0x3F00_0000);
pub const HIGH_MEMORY_START: AddressVirtual = AddressVirtual::new(_HIGH_MEMORY_START);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub struct AddressPhysical {
    addr: u64,
}

impl AddressPhysical {
    pub const fn new(addr: u64) -> Self {
        assert!(addr < ADDRESS_SPACE_SIZE);
        Self { addr }
    }

    pub const fn add(&self, offset: u64) -> Self {
        Self::new(self.addr + offset)
    }

    pub const fn as_virtual(&self) -> AddressVirtual {
        HIGH_MEMORY_START.add(self.addr)
    }

    pub const fn as_bus(&self) -> AddressBus {
        let peripherals_base = PERIPHERALS_PHYS.as_u64();
        let addr = if self.addr < peripherals_base {
            self.addr as u32 + *VC_MMU_RAM_RANGE.start()
        } else {
            self.addr as u32 + (*VC_MMU_PERIPHERALS_RANGE.start() - peripherals_base as u32)
        };
        AddressBus::new(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.addr
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub struct AddressVirtual {
    addr: u64,
}

impl AddressVirtual {
    // Clippy complains that the second check in the assert!() is always true,
    // however ADDRESS_SPACE_SIZE might change in the future
    #[allow(clippy::absurd_extreme_comparisons)]
    pub const fn new(addr: u64) -> Self {
        assert!(
            (addr >= _HIGH_MEMORY_START) && (addr <= _HIGH_MEMORY_START + (ADDRESS_SPACE_SIZE - 1))
        );
        Self { addr }
    }

    /// Returns `None` for addresses outside the kernel's linear mapping, e.g.
    /// user space buffers or the stack of a host-side test.
    pub const fn try_new(addr: u64) -> Option<Self> {
        if addr >= _HIGH_MEMORY_START {
            Some(Self { addr })
        } else {
            None
        }
    }

    pub const fn add(&self, offset: u64) -> Self {
        Self::new(self.addr + offset)
    }

    pub const fn as_physical(&self) -> AddressPhysical {
        AddressPhysical::new(self.addr - HIGH_MEMORY_START.as_u64())
    }

    pub const fn as_bus(&self) -> AddressBus {
        self.as_physical().as_bus()
    }

    pub const fn as_u64(&self) -> u64 {
        self.addr
    }

    pub const fn is_kernel(addr: usize) -> bool {
        addr as u64 >= _HIGH_MEMORY_START
    }
}

// See BCM2835-ARM-Peripherals.pdf section 1.2.4 Bus Addresses
// The VC MMU mapping are taken from here (should be the same for 2836 and 2837):
// https://lists.denx.de/pipermail/u-boot/2015-March/208201.html
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub struct AddressBus {
    addr: u32,
}

impl AddressBus {
    pub const fn new(addr: u32) -> Self {
        let in_ram_range = addr >= *VC_MMU_RAM_RANGE.start() && addr <= *VC_MMU_RAM_RANGE.end();
        let in_peripherals_range =
            addr >= *VC_MMU_PERIPHERALS_RANGE.start() && addr <= *VC_MMU_PERIPHERALS_RANGE.end();
        assert!(in_ram_range || in_peripherals_range);
        Self { addr }
    }

    pub const fn as_u32(&self) -> u32 {
        self.addr
    }
}
