use core::{fmt, num::NonZeroU32};

/// The category of an OSAL object.
///
/// The discriminants are the category numbers the portable layer encodes in
/// the upper bits of an [`ObjectId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ObjectType {
    Task = 0x01,
    Queue = 0x02,
    CountSem = 0x03,
    BinSem = 0x04,
    Mutex = 0x05,
    TimeBase = 0x08,
    CondVar = 0x0d,
}

impl ObjectType {
    /// All object categories, in the order of [`ObjectType::index`].
    pub const ALL: [Self; Self::COUNT] = [
        Self::Task,
        Self::Queue,
        Self::CountSem,
        Self::BinSem,
        Self::Mutex,
        Self::TimeBase,
        Self::CondVar,
    ];

    pub const COUNT: usize = 7;

    /// Get a dense index in range `0..COUNT`, suitable for per-category
    /// arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Task => 0,
            Self::Queue => 1,
            Self::CountSem => 2,
            Self::BinSem => 3,
            Self::Mutex => 4,
            Self::TimeBase => 5,
            Self::CondVar => 6,
        }
    }

    /// Decode the category number found in an [`ObjectId`].
    pub fn from_raw(x: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| *ty as u16 == x)
    }
}

/// The number of bits of an [`ObjectId`] used for the serial number.
pub const OBJECT_ID_SERIAL_BITS: u32 = 16;

const OBJECT_ID_SERIAL_MASK: u32 = (1 << OBJECT_ID_SERIAL_BITS) - 1;

/// The public, stable identifier of an OSAL object.
///
/// The upper bits hold the [`ObjectType`] and the lower
/// [`OBJECT_ID_SERIAL_BITS`] bits hold a serial number. Because the category
/// is never zero, neither is an ID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(NonZeroU32);

impl ObjectId {
    /// Construct an `ObjectId` from a category and a serial number.
    /// Only the lower [`OBJECT_ID_SERIAL_BITS`] bits of `serial` are used.
    #[inline]
    pub fn new(obj_type: ObjectType, serial: u32) -> Self {
        let raw = ((obj_type as u32) << OBJECT_ID_SERIAL_BITS) | (serial & OBJECT_ID_SERIAL_MASK);
        // `obj_type as u32` is never zero
        match NonZeroU32::new(raw) {
            Some(x) => Self(x),
            None => unreachable!(),
        }
    }

    /// Reinterpret a raw value. Returns `None` if it does not encode a known
    /// category.
    pub fn from_raw(raw: u32) -> Option<Self> {
        ObjectType::from_raw((raw >> OBJECT_ID_SERIAL_BITS) as u16)?;
        NonZeroU32::new(raw).map(Self)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    #[inline]
    pub fn obj_type(self) -> ObjectType {
        match ObjectType::from_raw((self.0.get() >> OBJECT_ID_SERIAL_BITS) as u16) {
            Some(ty) => ty,
            // `ObjectId` is only constructed with a valid category
            None => unreachable!(),
        }
    }

    #[inline]
    pub fn serial(self) -> u32 {
        self.0.get() & OBJECT_ID_SERIAL_MASK
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({:#x})", self.0.get())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// An opaque handle to one live slot of an object table.
///
/// A token is issued by [`IdMap::allocate`] and stays valid until the slot is
/// released. Backends use [`ObjectToken::obj_idx`] to index their per-category
/// implementation records.
///
/// [`IdMap::allocate`]: crate::IdMap::allocate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectToken {
    obj_type: ObjectType,
    obj_idx: usize,
    obj_id: ObjectId,
}

impl ObjectToken {
    /// Construct a token directly. Normally tokens come from an [`IdMap`].
    ///
    /// [`IdMap`]: crate::IdMap
    #[inline]
    pub fn new(obj_type: ObjectType, obj_idx: usize, obj_id: ObjectId) -> Self {
        Self {
            obj_type,
            obj_idx,
            obj_id,
        }
    }

    #[inline]
    pub fn obj_type(&self) -> ObjectType {
        self.obj_type
    }

    /// The slot index within the category's table.
    #[inline]
    pub fn obj_idx(&self) -> usize {
        self.obj_idx
    }

    #[inline]
    pub fn obj_id(&self) -> ObjectId {
        self.obj_id
    }
}
