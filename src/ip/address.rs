//! IPv4 address assignment.
//!
//! Addresses are handed out sequentially inside one subnet, starting at
//! the first host address. The network and broadcast addresses are never
//! assigned, and a device is never silently given a second address.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::topology::DeviceId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("subnet {network}/{prefix} has no free host addresses left")]
    SubnetExhausted { network: Ipv4Addr, prefix: u32 },
    #[error("{device} already has address {address}")]
    AlreadyAssigned { device: DeviceId, address: Ipv4Addr },
    #[error("{0} is not a contiguous subnet mask")]
    InvalidMask(Ipv4Addr),
    #[error("base {base} has host bits set for mask {mask}")]
    BaseNotNetwork { base: Ipv4Addr, mask: Ipv4Addr },
}

/// Device <-> address mapping for one subnet.
#[derive(Debug, Default, Clone)]
pub struct AddressTable {
    by_device: BTreeMap<DeviceId, Ipv4Addr>,
    by_address: BTreeMap<Ipv4Addr, DeviceId>,
}

impl AddressTable {
    pub fn resolve(&self, address: Ipv4Addr) -> Option<DeviceId> {
        self.by_address.get(&address).copied()
    }

    pub fn address_of(&self, device: DeviceId) -> Option<Ipv4Addr> {
        self.by_device.get(&device).copied()
    }

    pub fn len(&self) -> usize {
        self.by_device.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }

    fn insert(&mut self, device: DeviceId, address: Ipv4Addr) {
        self.by_device.insert(device, address);
        self.by_address.insert(address, device);
    }
}

/// Sequential host address allocator for a single subnet.
#[derive(Debug, Clone)]
pub struct Ipv4AddressAllocator {
    network: u32,
    mask: u32,
    next_host: u32,
}

impl Ipv4AddressAllocator {
    pub fn new(base: Ipv4Addr, mask: Ipv4Addr) -> Result<Self, AddressError> {
        let mask_bits = u32::from(mask);
        if mask_bits.leading_ones() + mask_bits.trailing_zeros() != 32 {
            return Err(AddressError::InvalidMask(mask));
        }
        let network = u32::from(base);
        if network & !mask_bits != 0 {
            return Err(AddressError::BaseNotNetwork { base, mask });
        }
        Ok(Self { network, mask: mask_bits, next_host: 1 })
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    pub fn prefix_len(&self) -> u32 {
        self.mask.leading_ones()
    }

    /// Host addresses that can ever be handed out.
    pub fn capacity(&self) -> u32 {
        (!self.mask).saturating_sub(1)
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network | !self.mask)
    }

    /// Assign the next free address to each device in order.
    ///
    /// Fails without touching the table if any device already has an
    /// address or the subnet cannot hold them all.
    pub fn assign(&mut self, table: &mut AddressTable, devices: &[DeviceId]) -> Result<Vec<Ipv4Addr>, AddressError> {
        for &device in devices {
            if let Some(address) = table.address_of(device) {
                return Err(AddressError::AlreadyAssigned { device, address });
            }
        }
        let needed = devices.len() as u64;
        let remaining = u64::from(self.capacity()).saturating_sub(u64::from(self.next_host - 1));
        if needed > remaining {
            return Err(AddressError::SubnetExhausted { network: self.network(), prefix: self.prefix_len() });
        }

        let mut assigned = Vec::with_capacity(devices.len());
        for &device in devices {
            let address = Ipv4Addr::from(self.network | self.next_host);
            self.next_host += 1;
            table.insert(device, address);
            log::debug!("Assigned {} to {}", address, device);
            assigned.push(address);
        }
        Ok(assigned)
    }
}
