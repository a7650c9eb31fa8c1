//! The subset of the FMI 2.0 `modelDescription.xml` the bridge reads.
//!
//! Elements and attributes not listed here are skipped.

use crate::signal::Unit;

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "fmiModelDescription")]
pub struct ModelDescription {
    #[xml(attr = "fmiVersion")]
    pub fmi_version: String,
    #[xml(attr = "modelName")]
    pub model_name: String,
    #[xml(attr = "guid")]
    pub guid: String,
    #[xml(child = "ModelExchange")]
    pub model_exchange: Option<ModelExchange>,
    #[xml(child = "UnitDefinitions")]
    pub unit_definitions: Option<UnitDefinitions>,
    #[xml(child = "LogCategories")]
    pub log_categories: Option<LogCategories>,
    #[xml(child = "ModelVariables")]
    pub model_variables: ModelVariables,
}

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "ModelExchange")]
pub struct ModelExchange {
    #[xml(attr = "modelIdentifier")]
    pub model_identifier: String,
}

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "UnitDefinitions")]
pub struct UnitDefinitions {
    #[xml(child = "Unit")]
    pub units: Vec<UnitDefinition>,
}

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "Unit")]
pub struct UnitDefinition {
    #[xml(attr = "name")]
    pub name: String,
    /// BaseUnit_value = factor*Unit_value + offset
    #[xml(child = "BaseUnit")]
    pub base_unit: Option<BaseUnit>,
}

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "BaseUnit")]
pub struct BaseUnit {
    #[xml(attr = "factor")]
    pub factor: Option<f64>,
    #[xml(attr = "offset")]
    pub offset: Option<f64>,
}

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "LogCategories")]
pub struct LogCategories {
    #[xml(child = "Category")]
    pub categories: Vec<Category>,
}

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "Category")]
pub struct Category {
    #[xml(attr = "name")]
    pub name: String,
}

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "ModelVariables")]
pub struct ModelVariables {
    #[xml(child = "ScalarVariable")]
    pub variables: Vec<ScalarVariable>,
}

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "ScalarVariable")]
pub struct ScalarVariable {
    #[xml(attr = "name")]
    pub name: String,
    #[xml(attr = "valueReference")]
    pub value_reference: u32,
    #[xml(attr = "causality")]
    pub causality: Option<String>,
    #[xml(child = "Real")]
    pub real: Option<Real>,
}

#[derive(Default, PartialEq, Debug, hard_xml::XmlRead)]
#[xml(tag = "Real")]
pub struct Real {
    #[xml(attr = "unit")]
    pub unit: Option<String>,
}

impl ModelDescription {
    pub fn log_category_names(&self) -> Vec<String> {
        self.log_categories
            .iter()
            .flat_map(|categories| categories.categories.iter())
            .map(|category| category.name.clone())
            .collect()
    }

    /// Look up a unit and its conversion to SI. A unit without a `BaseUnit` converts with the
    /// identity.
    pub fn unit(&self, name: &str) -> Unit {
        let base = self
            .unit_definitions
            .iter()
            .flat_map(|definitions| definitions.units.iter())
            .find(|unit| unit.name == name)
            .and_then(|unit| unit.base_unit.as_ref());
        Unit {
            name: name.to_owned(),
            factor: base.and_then(|base| base.factor).unwrap_or(1.0),
            offset: base.and_then(|base| base.offset).unwrap_or(0.0),
        }
    }

    /// Real variables with their value references and units.
    pub fn real_variables(&self) -> impl Iterator<Item = (&ScalarVariable, Option<Unit>)> + '_ {
        self.model_variables
            .variables
            .iter()
            .filter_map(move |variable| {
                let real = variable.real.as_ref()?;
                Some((variable, real.unit.as_deref().map(|name| self.unit(name))))
            })
    }
}

#[cfg(test)]
mod tests {
    use hard_xml::XmlRead;

    use super::*;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fmiModelDescription fmiVersion="2.0" modelName="bui" guid="{0d0b3c6b}" generationTool="spawn">
  <ModelExchange modelIdentifier="bui" canGetAndSetFMUstate="false"/>
  <UnitDefinitions>
    <Unit name="degC"><BaseUnit K="1" offset="273.15"/></Unit>
    <Unit name="W"><BaseUnit kg="1" m="2" s="-3"/></Unit>
  </UnitDefinitions>
  <LogCategories>
    <Category name="logLevel1"/>
    <Category name="logLevel2"/>
  </LogCategories>
  <DefaultExperiment startTime="0"/>
  <ModelVariables>
    <ScalarVariable name="Core_ZN_T" valueReference="1" causality="input"><Real unit="degC"/></ScalarVariable>
    <ScalarVariable name="Core_ZN_QConSen_flow" valueReference="2" causality="output"><Real unit="W"/></ScalarVariable>
    <ScalarVariable name="flag" valueReference="3" causality="output"><Integer/></ScalarVariable>
    <ScalarVariable name="Core_ZN_V" valueReference="4" causality="parameter"><Real/></ScalarVariable>
  </ModelVariables>
  <ModelStructure/>
</fmiModelDescription>"#;

    #[test]
    fn parse_model_description() {
        let md = ModelDescription::from_str(XML).unwrap();
        assert_eq!(md.fmi_version, "2.0");
        assert_eq!(md.model_exchange.as_ref().unwrap().model_identifier, "bui");
        assert_eq!(md.log_category_names(), vec!["logLevel1", "logLevel2"]);

        let reals: Vec<_> = md.real_variables().collect();
        assert_eq!(reals.len(), 3);
        let (t, unit) = &reals[0];
        assert_eq!(t.name, "Core_ZN_T");
        let unit = unit.as_ref().unwrap();
        assert_eq!(unit.offset, 273.15);
        assert_eq!(unit.factor, 1.0);
        assert!(reals[2].1.is_none());
    }
}
