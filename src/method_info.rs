use crate::descriptor;
use crate::mutation::Location;

pub(crate) const ACC_STATIC: u16 = 0x0008;
pub(crate) const ACC_BRIDGE: u16 = 0x0040;
pub(crate) const ACC_SYNTHETIC: u16 = 0x1000;
pub(crate) const ACC_ENUM: u16 = 0x4000;

/// The method currently being visited, with its owner's access flags.
#[derive(Clone, Debug)]
pub struct MethodInfo {
    owner: String,
    owner_access: u16,
    name: String,
    descriptor: String,
    access: u16,
}

impl MethodInfo {
    pub fn new(
        owner: impl Into<String>,
        owner_access: u16,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        access: u16,
    ) -> Self {
        Self {
            owner: owner.into(),
            owner_access,
            name: name.into(),
            descriptor: descriptor.into(),
            access,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Location {
        Location::new(&self.owner, &self.name, &self.descriptor)
    }

    pub fn is_void(&self) -> bool {
        descriptor::is_void(&self.descriptor)
    }

    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.access & ACC_SYNTHETIC != 0
    }

    pub fn is_bridge(&self) -> bool {
        self.access & ACC_BRIDGE != 0
    }

    pub fn is_static_initializer(&self) -> bool {
        self.is_static() && self.name == "<clinit>"
    }

    pub fn is_in_enum(&self) -> bool {
        self.owner_access & ACC_ENUM != 0
    }

    /// Methods the compiler synthesises for every enum.
    ///
    /// For `<clinit>` only the prefix that builds `$VALUES` is generated; the
    /// enum filter narrows the suppression to that prefix.
    pub fn is_generated_enum_method(&self) -> bool {
        self.is_in_enum()
            && (self.is_values_method() || self.is_value_of_method() || self.is_static_initializer())
    }

    fn is_values_method(&self) -> bool {
        self.name == "values" && self.descriptor == format!("()[L{};", self.owner)
    }

    fn is_value_of_method(&self) -> bool {
        self.name == "valueOf" && self.descriptor == format!("(Ljava/lang/String;)L{};", self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enum_method(name: &str, descriptor: &str) -> MethodInfo {
        MethodInfo::new("com/example/Color", ACC_ENUM | 0x0011, name, descriptor, 0x0009)
    }

    #[test]
    fn generated_enum_methods_are_recognised() {
        assert!(enum_method("values", "()[Lcom/example/Color;").is_generated_enum_method());
        assert!(
            enum_method("valueOf", "(Ljava/lang/String;)Lcom/example/Color;")
                .is_generated_enum_method()
        );
        assert!(enum_method("<clinit>", "()V").is_generated_enum_method());
    }

    #[test]
    fn user_methods_in_enums_are_not_generated() {
        assert!(!enum_method("values", "(I)[Lcom/example/Color;").is_generated_enum_method());
        assert!(!enum_method("<init>", "(Ljava/lang/String;I)V").is_generated_enum_method());
        assert!(!enum_method("describe", "()Ljava/lang/String;").is_generated_enum_method());
    }

    #[test]
    fn values_outside_enum_is_not_generated() {
        let method = MethodInfo::new("com/example/Plain", 0x0021, "values", "()[Lcom/example/Plain;", 0x0009);

        assert!(!method.is_generated_enum_method());
    }

    #[test]
    fn access_predicates_decode_flags() {
        let method = MethodInfo::new("A", 0, "bridge", "()Ljava/lang/Object;", ACC_BRIDGE | ACC_SYNTHETIC);

        assert!(method.is_bridge());
        assert!(method.is_synthetic());
        assert!(!method.is_static());
        assert!(!method.is_void());
    }
}
