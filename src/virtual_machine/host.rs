//! Host side of the VM's I/O contract.
//!
//! A program requests I/O by pushing a selector byte and calling the `io`
//! function. [`Vm::run`](super::vm::Vm::run) pops the selector and hands it to
//! a [`Host`], which then pops arguments and pushes results through the VM's
//! public stack primitives. What each selector means belongs to the host;
//! [`IoSelector`] names the ones the robot simulation understands so that the
//! assembler can accept them as literals (`push8 #motor`).

use crate::virtual_machine::vm::Vm;

/// Receives I/O requests from a running VM.
pub trait Host {
    /// Handles one request. `selector` has already been popped.
    fn io(&mut self, selector: u8, vm: &mut Vm);
}

/// Host that ignores every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn io(&mut self, _selector: u8, _vm: &mut Vm) {}
}

macro_rules! define_selectors {
    ( $( $(#[$doc:meta])* $name:ident = $value:literal, $text:literal ),* $(,)? ) => {
        /// Robot devices addressable through the I/O protocol.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum IoSelector {
            $( $(#[$doc])* $name = $value, )*
        }

        impl IoSelector {
            /// All selectors, in protocol order.
            pub const ALL: &'static [IoSelector] = &[ $( IoSelector::$name ),* ];

            /// Assembly name of the selector.
            pub const fn name(self) -> &'static str {
                match self {
                    $( IoSelector::$name => $text, )*
                }
            }

            /// Looks a selector up by name, ignoring case.
            pub fn from_name(name: &str) -> Option<IoSelector> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|selector| selector.name().eq_ignore_ascii_case(name))
            }
        }

        impl TryFrom<u8> for IoSelector {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(IoSelector::$name), )*
                    other => Err(other),
                }
            }
        }
    };
}

define_selectors! {
    /// pops a float: drive power
    Motor = 1, "motor",
    /// pops a float: steering angle
    Steer = 2, "steer",
    /// pushes a float: battery level
    Battery = 3, "battery",
    /// pushes a float: distance sensor reading
    Sensor = 4, "sensor",
    /// pushes two floats: accelerometer deltas
    Accel = 5, "accel",
    /// pushes a byte: the world mark under the robot
    MarkRead = 6, "mark_read",
    /// pops a byte: writes the world mark under the robot
    MarkWrite = 7, "mark_write",
}
