//! Network-byte-order integer storage for wire structs.

macro_rules! be_int {
    ($name:ident, $prim:ty) => {
        #[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
        #[repr(transparent)]
        pub(crate) struct $name($prim);

        impl $name {
            pub(crate) fn get(self) -> $prim {
                <$prim>::from_be(self.0)
            }
        }

        impl From<$prim> for $name {
            fn from(value: $prim) -> Self {
                Self(value.to_be())
            }
        }
    };
}

be_int!(U16, u16);
be_int!(U32, u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_storage() {
        let v = U16::from(0x1234);
        assert_eq!(bytemuck::bytes_of(&v), &[0x12, 0x34]);
        assert_eq!(v.get(), 0x1234);

        let v = U32::from(0x1234_5678);
        assert_eq!(bytemuck::bytes_of(&v), &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(v.get(), 0x1234_5678);
    }
}
