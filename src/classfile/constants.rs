//! Class file constants.

use bitflags::bitflags;

/// Class file magic number.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

// =============================================================================
// Constant Pool Tags
// =============================================================================

pub const CONSTANT_UTF8: u8 = 1;
pub const CONSTANT_INTEGER: u8 = 3;
pub const CONSTANT_FLOAT: u8 = 4;
pub const CONSTANT_LONG: u8 = 5;
pub const CONSTANT_DOUBLE: u8 = 6;
pub const CONSTANT_CLASS: u8 = 7;
pub const CONSTANT_STRING: u8 = 8;
pub const CONSTANT_FIELDREF: u8 = 9;
pub const CONSTANT_METHODREF: u8 = 10;
pub const CONSTANT_INTERFACE_METHODREF: u8 = 11;
pub const CONSTANT_NAME_AND_TYPE: u8 = 12;
pub const CONSTANT_METHOD_HANDLE: u8 = 15;
pub const CONSTANT_METHOD_TYPE: u8 = 16;
pub const CONSTANT_DYNAMIC: u8 = 17;
pub const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
pub const CONSTANT_MODULE: u8 = 19;
pub const CONSTANT_PACKAGE: u8 = 20;

// =============================================================================
// Attribute Names
// =============================================================================

pub const ATTR_CODE: &str = "Code";
pub const ATTR_SOURCE_FILE: &str = "SourceFile";
pub const ATTR_SIGNATURE: &str = "Signature";
pub const ATTR_INNER_CLASSES: &str = "InnerClasses";
pub const ATTR_ENCLOSING_METHOD: &str = "EnclosingMethod";
pub const ATTR_LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
pub const ATTR_LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
pub const ATTR_BOOTSTRAP_METHODS: &str = "BootstrapMethods";
pub const ATTR_RECORD: &str = "Record";
pub const ATTR_ANNOTATION_DEFAULT: &str = "AnnotationDefault";
pub const ATTR_RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const ATTR_RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
pub const ATTR_RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
pub const ATTR_RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str =
    "RuntimeInvisibleParameterAnnotations";
pub const ATTR_RUNTIME_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
pub const ATTR_RUNTIME_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";

// =============================================================================
// Method Handle Kinds
// =============================================================================

pub const REF_GET_FIELD: u8 = 1;
pub const REF_PUT_STATIC: u8 = 4;
pub const REF_INVOKE_STATIC: u8 = 6;

/// Owner of the bootstrap methods behind Java lambdas and method references.
pub const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

// =============================================================================
// Access Flags
// =============================================================================

bitflags! {
    /// Access flags shared by classes, fields, methods and inner class entries.
    ///
    /// Several bits are reused with a different meaning depending on where the
    /// flags appear (e.g. `SUPER` on classes is `SYNCHRONIZED` on methods).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        /// `ACC_SUPER` on classes, `ACC_SYNCHRONIZED` on methods
        const SUPER = 0x0020;
        /// `ACC_VOLATILE` on fields, `ACC_BRIDGE` on methods
        const VOLATILE = 0x0040;
        /// `ACC_TRANSIENT` on fields, `ACC_VARARGS` on methods
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    /// Returns true if none of public/protected/private is set.
    #[inline]
    pub fn is_package_private(self) -> bool {
        !self.intersects(AccessFlags::PUBLIC | AccessFlags::PROTECTED | AccessFlags::PRIVATE)
    }

    /// Returns true if the private bit is set.
    #[inline]
    pub fn is_private(self) -> bool {
        self.contains(AccessFlags::PRIVATE)
    }

    /// Widens package-private access to public, leaving other bits alone.
    #[inline]
    pub fn widened(self) -> Self {
        if self.is_package_private() {
            self | AccessFlags::PUBLIC
        } else {
            self
        }
    }
}
