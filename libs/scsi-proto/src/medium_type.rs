// Vendored from https://github.com/stm32-rs/stm32-usbd tag v0.6.0
// Original copyright (c) 2021 Matti Virkkunen <mvirkkunen@gmail.com>, Vadim Kaushan <admin@disasm.info>,
// Nicolas Stalder <n@stalder.io>", Jonas Martin <lichtfeind@gmail.com>
// SPDX-License-Identifier: MIT
// SPDX-LIcense-Identifier: Apache 2.0

use num_derive::{FromPrimitive, ToPrimitive};

#[derive(Clone, Copy, Eq, PartialEq, Debug, FromPrimitive, ToPrimitive)]
pub enum MediumType {
    Sbc = 0x00,
}

impl Default for MediumType {
    fn default() -> Self { MediumType::Sbc }
}
