//! MPU6050 I2C Address
//!
//! The 7-bit address is selected by the AD0 pin:
//! - AD0 low (or floating, internal pulldown): 0x68
//! - AD0 high: 0x69

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Address {
    /// AD0 connected to GND
    #[default]
    Ad0Low,
    /// AD0 connected to VCC
    Ad0High,
}

impl From<Address> for u8 {
    fn from(addr: Address) -> Self {
        match addr {
            Address::Ad0Low => 0x68,
            Address::Ad0High => 0x69,
        }
    }
}
