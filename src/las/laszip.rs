//! Description of the fields of a point record, as stored
//! in the record_data of the Laszip Vlr.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::LasZipError;
use crate::las::point14::Point14;
use crate::las::rgb::RGB;
use crate::las::rgbnir::RGBNIR;

/// The layered compression version
pub const LAYERED_VERSION: u16 = 3;

/// The different type of data / fields found in the definition of the LAS points
/// of the point formats 6 to 8
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LazItemType {
    /// Point14 is the Point format id 6 of LAS for versions >= 1.4
    Point14,
    /// RGB14 is the RGB of the point format 7
    RGB14,
    /// RGBNIR14 is the RGB and NIR of the point format 8
    RGBNIR14,
}

impl LazItemType {
    pub fn size(&self) -> u16 {
        match self {
            LazItemType::Point14 => Point14::SIZE as u16,
            LazItemType::RGB14 => RGB::SIZE as u16,
            LazItemType::RGBNIR14 => RGBNIR::SIZE as u16,
        }
    }

    /// Returns the item type with the given laszip code
    pub fn from_code(code: u16) -> crate::Result<Self> {
        match code {
            10 => Ok(LazItemType::Point14),
            11 => Ok(LazItemType::RGB14),
            12 => Ok(LazItemType::RGBNIR14),
            _ => Err(LasZipError::UnknownLazItem(code)),
        }
    }
}

impl From<LazItemType> for u16 {
    fn from(t: LazItemType) -> Self {
        match t {
            LazItemType::Point14 => 10,
            LazItemType::RGB14 => 11,
            LazItemType::RGBNIR14 => 12,
        }
    }
}

/// This gives information about the dimension encoded and the version used
/// when encoding the data.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LazItem {
    pub(crate) item_type: LazItemType,
    pub(crate) size: u16,
    pub(crate) version: u16,
}

impl LazItem {
    pub fn new(item_type: LazItemType, version: u16) -> Self {
        let size = item_type.size();
        Self {
            item_type,
            size,
            version,
        }
    }

    pub fn item_type(&self) -> LazItemType {
        self.item_type
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// Reads the item type code, size and version
    pub fn read_from<R: Read>(src: &mut R) -> crate::Result<Self> {
        let item_type = LazItemType::from_code(src.read_u16::<LittleEndian>()?)?;
        let size = src.read_u16::<LittleEndian>()?;
        let version = src.read_u16::<LittleEndian>()?;
        Ok(Self {
            item_type,
            size,
            version,
        })
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(self.item_type.into())?;
        dst.write_u16::<LittleEndian>(self.size)?;
        dst.write_u16::<LittleEndian>(self.version)?;
        Ok(())
    }
}

/// Reads the number of items and the items
pub fn read_laz_items_from<R: Read>(src: &mut R) -> crate::Result<Vec<LazItem>> {
    let num_items = src.read_u16::<LittleEndian>()?;
    let mut items = Vec::<LazItem>::with_capacity(num_items as usize);
    for _ in 0..num_items {
        items.push(LazItem::read_from(src)?)
    }
    Ok(items)
}

pub fn write_laz_items_to<W: Write>(laz_items: &[LazItem], dst: &mut W) -> std::io::Result<()> {
    dst.write_u16::<LittleEndian>(laz_items.len() as u16)?;
    for item in laz_items {
        item.write_to(dst)?;
    }
    Ok(())
}

#[derive(Default)]
pub struct LazItemRecordBuilder {
    items: Vec<LazItemType>,
}

impl LazItemRecordBuilder {
    /// The items of the point formats 6, 7 and 8 (without extra bytes)
    pub fn default_for_point_format_id(point_format_id: u8) -> crate::Result<Vec<LazItem>> {
        let mut builder = Self::new();
        match point_format_id {
            6 => builder.add_item(LazItemType::Point14),
            7 => builder
                .add_item(LazItemType::Point14)
                .add_item(LazItemType::RGB14),
            8 => builder
                .add_item(LazItemType::Point14)
                .add_item(LazItemType::RGBNIR14),
            _ => return Err(LasZipError::UnsupportedPointFormat(point_format_id)),
        };
        Ok(builder.build())
    }

    pub fn new() -> Self {
        Self { items: vec![] }
    }

    pub fn add_item(&mut self, item_type: LazItemType) -> &mut Self {
        self.items.push(item_type);
        self
    }

    /// The items all use the layered version
    pub fn build(&self) -> Vec<LazItem> {
        self.items
            .iter()
            .map(|item_type| LazItem::new(*item_type, LAYERED_VERSION))
            .collect()
    }
}

/// Size in bytes of the points described by the items
pub fn point_size_of(items: &[LazItem]) -> usize {
    items.iter().map(|item| item.size as usize).sum()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn point_format_8_items() {
        let items = LazItemRecordBuilder::default_for_point_format_id(8).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_type(), LazItemType::Point14);
        assert_eq!(items[1].size(), 8);
        assert!(items.iter().all(|item| item.version() == 3));
        assert_eq!(point_size_of(&items), 38);
    }

    #[test]
    fn older_point_formats_are_refused() {
        assert!(matches!(
            LazItemRecordBuilder::default_for_point_format_id(3),
            Err(LasZipError::UnsupportedPointFormat(3))
        ));
    }

    #[test]
    fn items_record_data() {
        let items = LazItemRecordBuilder::new()
            .add_item(LazItemType::Point14)
            .add_item(LazItemType::RGB14)
            .build();
        let mut data = Cursor::new(Vec::<u8>::new());
        write_laz_items_to(&items, &mut data).unwrap();
        assert_eq!(
            data.get_ref(),
            &vec![2, 0, 10, 0, 30, 0, 3, 0, 11, 0, 6, 0, 3, 0]
        );
        data.set_position(0);
        assert_eq!(read_laz_items_from(&mut data).unwrap(), items);
    }

    #[test]
    fn unknown_item_codes() {
        // point10 and byte14 are not supported
        let mut data = Cursor::new(vec![1u8, 0, 6, 0, 20, 0, 2, 0]);
        assert!(matches!(
            read_laz_items_from(&mut data),
            Err(LasZipError::UnknownLazItem(6))
        ));
        assert!(LazItemType::from_code(14).is_err());
    }
}
