//! Built-in rule catalog: the OpenAPI rules and the OWASP rules

use super::RuleSet;
use crate::diagnostic::Severity;
use crate::rule::{Rule, RuleAction, RuleCategory, RuleType, SpecFormat};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

const DOCS: &str = "https://frost.dev/rules";

/// Every operation method, as a JSONPath union
const METHODS: &str = "[get,put,post,delete,options,head,patch,trace]";

/// Both catalogs, keyed by rule id
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    openapi: BTreeMap<String, Rule>,
    owasp: BTreeMap<String, Rule>,
}

impl RuleCatalog {
    pub fn new(openapi: Vec<Rule>, owasp: Vec<Rule>) -> Self {
        let key = |rules: Vec<Rule>| {
            rules
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            openapi: key(openapi),
            owasp: key(owasp),
        }
    }

    /// The process-wide default catalog
    pub fn builtin() -> Arc<RuleCatalog> {
        static BUILTIN: OnceLock<Arc<RuleCatalog>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| Arc::new(RuleCatalog::new(openapi_rules(), owasp_rules())))
            .clone()
    }

    pub fn openapi_rules(&self) -> &BTreeMap<String, Rule> {
        &self.openapi
    }

    pub fn owasp_rules(&self) -> &BTreeMap<String, Rule> {
        &self.owasp
    }

    /// Look a rule up in the OpenAPI catalog, then the OWASP catalog
    pub fn find(&self, id: &str) -> Option<&Rule> {
        self.openapi.get(id).or_else(|| self.owasp.get(id))
    }

    /// OpenAPI rules marked recommended
    pub fn recommended(&self) -> RuleSet {
        RuleSet::from_rules(self.openapi.values().filter(|r| r.recommended).cloned())
            .with_description("Recommended rules for a high quality specification.")
            .with_documentation_uri(&format!("{}/recommended", DOCS))
    }

    /// Every OpenAPI rule
    pub fn all(&self) -> RuleSet {
        RuleSet::from_rules(self.openapi.values().cloned())
            .with_description("Every built-in OpenAPI rule.")
            .with_documentation_uri(&format!("{}/all", DOCS))
    }

    /// Every OWASP rule
    pub fn owasp(&self) -> RuleSet {
        RuleSet::from_rules(self.owasp.values().cloned())
            .with_description("All OWASP API security rules.")
            .with_documentation_uri(&format!("{}/owasp", DOCS))
    }

    /// OpenAPI and OWASP rules together
    pub fn all_combined(&self) -> RuleSet {
        RuleSet::from_rules(self.openapi.values().chain(self.owasp.values()).cloned())
            .with_description("All OpenAPI and OWASP rules combined.")
            .with_documentation_uri(&format!("{}/all-combined", DOCS))
    }

    /// A named profile: `recommended`, `all`, `owasp` or one of their aliases
    pub fn profile(&self, name: &str) -> Option<RuleSet> {
        match name {
            "recommended" | "vacuum:oas" | "spectral:oas" => Some(self.recommended()),
            "all" => Some(self.all()),
            "owasp" | "vacuum:owasp" | "spectral:owasp" => Some(self.owasp()),
            "vacuum:all" => Some(self.all_combined()),
            _ => None,
        }
    }
}

fn options<const N: usize>(pairs: [(&str, Value); N]) -> Value {
    Value::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn strings(items: &[&str]) -> Value {
    Value::List(items.iter().map(|s| Value::from(*s)).collect())
}

fn docs(rule: Rule) -> Rule {
    let url = format!("{}/{}/{}", DOCS, rule.category, rule.id);
    rule.with_docs(&url)
}

/// Rule on the document root through a whole-document function
fn document_rule(id: &str, function: &str) -> Rule {
    Rule::new(id, "$", function)
}

/// The OpenAPI catalog
pub fn openapi_rules() -> Vec<Rule> {
    let oas2 = [SpecFormat::Oas2];
    let oas3 = SpecFormat::OAS3;
    let oas30 = [SpecFormat::Oas2, SpecFormat::Oas3];

    let rules = vec![
        // operations
        document_rule("operation-success-response", "oasOpSuccessResponse")
            .with_description("Operations must define at least one success (2xx/3xx) response")
            .with_how_to_fix("Add a `2xx` or `3xx` response to every operation")
            .with_category(RuleCategory::Operations)
            .recommended(),
        document_rule("operation-4xx-response", "oasOpErrorResponse")
            .with_description("Operations must define at least one 4xx error response")
            .with_how_to_fix("Describe how the operation fails, add a `4xx` response")
            .with_category(RuleCategory::Operations)
            .recommended(),
        document_rule("operation-operationId-unique", "oasOpIdUnique")
            .with_description("Every operation must have a unique `operationId`")
            .with_how_to_fix("Rename the duplicated `operationId` values")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Operations)
            .recommended(),
        document_rule("operation-operationId", "oasOpId")
            .with_description("Every operation must contain an `operationId`")
            .with_how_to_fix("Add an `operationId` to every operation")
            .with_category(RuleCategory::Operations)
            .recommended(),
        Rule::new(
            "operation-operationId-valid-in-url",
            &format!("$.paths[*]{}.operationId", METHODS),
            "pattern",
        )
        .with_options(options([(
            "match",
            Value::from(r"^[A-Za-z0-9\-._~:/?#\[\]@!$&'()*+,;=]*$"),
        )]))
        .with_message("operationId `{{value}}` contains characters that are not URL safe")
        .with_description("An `operationId` must only contain URL friendly characters")
        .with_how_to_fix("Remove characters that would need escaping in a URL")
        .with_severity(Severity::Error)
        .with_category(RuleCategory::Operations)
        .recommended(),
        document_rule("operation-parameters", "oasOpParams")
            .with_description("Operation parameters must be unique and have a single body parameter")
            .with_how_to_fix("Remove duplicated parameters")
            .with_category(RuleCategory::Operations)
            .recommended(),
        document_rule("path-params", "oasPathParam")
            .with_description("Path parameters must be declared and used correctly")
            .with_how_to_fix("Declare every templated parameter as a required `path` parameter")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Operations)
            .recommended(),
        Rule::new("path-declarations-must-exist", "$.paths[*]", "pattern")
            .with_field("@key")
            .with_options(options([("notMatch", Value::from(r"\{\}"))]))
            .with_message("Path `{{value}}` contains an empty parameter declaration `{}`")
            .with_description("Path parameter declarations must not be empty")
            .with_how_to_fix("Name every templated path parameter")
            .with_category(RuleCategory::Operations)
            .recommended(),
        Rule::new("path-keys-no-trailing-slash", "$.paths[*]", "pattern")
            .with_field("@key")
            .with_options(options([("notMatch", Value::from(r".+/$"))]))
            .with_message("Path `{{value}}` must not end with a slash")
            .with_description("Paths must not end with a trailing slash")
            .with_how_to_fix("Remove the trailing slash")
            .with_category(RuleCategory::Operations)
            .recommended(),
        Rule::new("path-not-include-query", "$.paths[*]", "pattern")
            .with_field("@key")
            .with_options(options([("notMatch", Value::from(r"\?"))]))
            .with_message("Path `{{value}}` must not include a query string")
            .with_description("Paths must not contain query parameters")
            .with_how_to_fix("Declare query parameters as `in: query` parameters instead")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Operations)
            .recommended(),
        Rule::new("no-http-verbs-in-path", "$.paths[*]", "pattern")
            .with_field("@key")
            .with_options(options([(
                "notMatch",
                Value::from(r"(?i)/(get|put|post|delete|patch|options|head|trace)(/|$)"),
            )]))
            .with_message("Path `{{value}}` contains an HTTP verb")
            .with_description("Paths should not contain HTTP verbs")
            .with_how_to_fix("Let the HTTP method describe the action")
            .with_category(RuleCategory::Operations)
            .with_type(RuleType::Style),
        document_rule("paths-kebab-case", "pathsKebabCase")
            .with_description("Path segments should be kebab-case")
            .with_how_to_fix("Use lower case words separated by hyphens")
            .with_category(RuleCategory::Operations)
            .with_type(RuleType::Style)
            .recommended(),
        document_rule("no-ambiguous-paths", "noAmbiguousPaths")
            .with_description("Paths must not be ambiguous with each other")
            .with_how_to_fix("Make templated paths distinguishable by their literal segments")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Operations)
            .recommended(),
        Rule::new("no-request-body", "$.paths[*][get,head,delete]", "undefined")
            .with_field("requestBody")
            .with_message("GET, HEAD and DELETE operations must not accept a request body")
            .with_description("GET, HEAD and DELETE operations should not define a `requestBody`")
            .with_how_to_fix("Move the payload into parameters or use another method")
            .with_category(RuleCategory::Operations)
            .with_formats(&oas3)
            .recommended(),
        // tags
        document_rule("operation-tags", "oasOpTags")
            .with_description("Operations must have at least one tag")
            .with_how_to_fix("Tag every operation")
            .with_category(RuleCategory::Tags)
            .recommended(),
        document_rule("operation-tag-defined", "oasTagDefined")
            .with_description("Operation tags must be defined in the global `tags`")
            .with_how_to_fix("Add the tag to the top level `tags` list")
            .with_category(RuleCategory::Tags)
            .recommended(),
        Rule::new(
            "operation-singular-tag",
            &format!("$.paths[*]{}.tags", METHODS),
            "length",
        )
        .with_options(options([("max", Value::Int(1))]))
        .with_message("Operations should only have a single tag")
        .with_description("Operations should be grouped under a single tag")
        .with_how_to_fix("Remove all but one tag")
        .with_category(RuleCategory::Tags),
        document_rule("tag-description", "oasTagDescription")
            .with_description("Tags must have a description")
            .with_how_to_fix("Describe every global tag")
            .with_category(RuleCategory::Tags)
            .recommended(),
        Rule::new("openapi-tags", "$", "truthy")
            .with_field("tags")
            .with_message("Top level `tags` must be defined and not empty")
            .with_description("The document should define global tags")
            .with_how_to_fix("Add a top level `tags` list")
            .with_category(RuleCategory::Tags),
        Rule::new("openapi-tags-alphabetical", "$.tags", "alphabetical")
            .with_options(options([("keyedBy", Value::from("name"))]))
            .with_description("Global tags should be in alphabetical order")
            .with_how_to_fix("Sort the `tags` list by name")
            .with_severity(Severity::Info)
            .with_category(RuleCategory::Tags)
            .with_type(RuleType::Style),
        // info
        Rule::new("info-contact", "$.info", "truthy")
            .with_field("contact")
            .with_message("Info section is missing contact details")
            .with_description("The `info` object should contain `contact` details")
            .with_how_to_fix("Add a `contact` object with a name, URL and email")
            .with_category(RuleCategory::Info)
            .recommended(),
        Rule::new("info-description", "$.info", "truthy")
            .with_field("description")
            .with_message("Info section is missing a description")
            .with_description("The `info` object should contain a description")
            .with_how_to_fix("Describe the API in `info.description`")
            .with_category(RuleCategory::Info)
            .recommended(),
        Rule::new("info-license", "$.info", "truthy")
            .with_field("license")
            .with_message("Info section should contain a license")
            .with_description("The `info` object should contain a `license`")
            .with_how_to_fix("Add a `license` object")
            .with_severity(Severity::Info)
            .with_category(RuleCategory::Info),
        Rule::new("license-url", "$.info.license", "truthy")
            .with_field("url")
            .with_message("License should contain a URL")
            .with_description("The license should link to its text")
            .with_how_to_fix("Add a `url` to the license")
            .with_severity(Severity::Info)
            .with_category(RuleCategory::Info),
        Rule::new("info-license-spdx", "$.info.license", "xor")
            .with_options(options([("properties", strings(&["url", "identifier"]))]))
            .with_description("A license must use either `url` or `identifier`, not both")
            .with_how_to_fix("Keep only one of `url` and `identifier`")
            .with_severity(Severity::Info)
            .with_category(RuleCategory::Info)
            .with_formats(&[SpecFormat::Oas31]),
        Rule::new("contact-properties", "$.info.contact", "truthy")
            .with_field("name")
            .with_action(RuleAction {
                field: Some("url".into()),
                ..RuleAction::new("truthy")
            })
            .with_action(RuleAction {
                field: Some("email".into()),
                ..RuleAction::new("truthy")
            })
            .with_description("Contact details should contain a name, URL and email")
            .with_how_to_fix("Fill in every contact property")
            .with_severity(Severity::Info)
            .with_category(RuleCategory::Info),
        // descriptions
        document_rule("operation-description", "oasDescriptions")
            .with_options(options([("minWords", Value::Int(1))]))
            .with_description("Operations must have a description")
            .with_how_to_fix("Describe what every operation does")
            .with_category(RuleCategory::Descriptions)
            .recommended(),
        document_rule("component-description", "oasComponentDescriptions")
            .with_options(options([("minWords", Value::Int(1))]))
            .with_description("Components should have a description")
            .with_how_to_fix("Describe every reusable component")
            .with_severity(Severity::Info)
            .with_category(RuleCategory::Descriptions)
            .with_formats(&oas3)
            .recommended(),
        Rule::new("oas2-parameter-description", "$..parameters[*]", "truthy")
            .with_field("description")
            .with_message("Parameter is missing a description")
            .with_description("Parameters should have a description")
            .with_how_to_fix("Describe every parameter")
            .with_category(RuleCategory::Descriptions)
            .with_formats(&oas2)
            .recommended(),
        Rule::new("oas3-parameter-description", "$..parameters[?(@.in)]", "truthy")
            .with_field("description")
            .with_message("Parameter is missing a description")
            .with_description("Parameters should have a description")
            .with_how_to_fix("Describe every parameter")
            .with_category(RuleCategory::Descriptions)
            .with_formats(&oas3)
            .recommended(),
        Rule::new("no-eval-in-markdown", "$..description", "pattern")
            .with_given("$..title")
            .with_options(options([("notMatch", Value::from(r"eval\("))]))
            .with_message("Descriptions must not contain `eval()` statements")
            .with_description("Markdown must not contain `eval()`")
            .with_how_to_fix("Remove the script from the description")
            .with_category(RuleCategory::Descriptions)
            .recommended(),
        Rule::new("no-script-tags-in-markdown", "$..description", "pattern")
            .with_options(options([("notMatch", Value::from(r"(?i)<script"))]))
            .with_message("Descriptions must not contain `<script>` tags")
            .with_description("Markdown must not contain script tags")
            .with_how_to_fix("Remove the script tag from the description")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Descriptions)
            .recommended(),
        // schemas
        document_rule("no-$ref-siblings", "refSiblings")
            .with_description("`$ref` values cannot be placed next to other properties")
            .with_how_to_fix("Move the siblings into the referenced schema, or wrap in `allOf`")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Schemas)
            .with_formats(&oas30)
            .unresolved()
            .recommended(),
        document_rule("oas3-unused-component", "oasUnusedComponent")
            .with_description("Components should be referenced somewhere")
            .with_how_to_fix("Remove orphaned components or reference them")
            .with_category(RuleCategory::Schemas)
            .with_formats(&oas3)
            .unresolved()
            .recommended(),
        document_rule("oas2-unused-definition", "oasUnusedComponent")
            .with_description("Definitions should be referenced somewhere")
            .with_how_to_fix("Remove orphaned definitions or reference them")
            .with_category(RuleCategory::Schemas)
            .with_formats(&oas2)
            .unresolved()
            .recommended(),
        Rule::new("typed-enum", "$..[?(@.enum && @.type)]", "typedEnum")
            .with_description("Enum values must match the declared type")
            .with_how_to_fix("Fix or remove enum values of the wrong type")
            .with_category(RuleCategory::Schemas)
            .recommended(),
        Rule::new("duplicated-entry-in-enum", "$..[?(@.enum)]", "duplicatedEnum")
            .with_description("Enums must not contain duplicates")
            .with_how_to_fix("Remove the duplicated values")
            .with_category(RuleCategory::Schemas)
            .recommended(),
        Rule::new("oas2-anyOf", "$..[?(@.anyOf)]", "undefined")
            .with_field("anyOf")
            .with_message("`anyOf` is not supported by OpenAPI 2")
            .with_description("OpenAPI 2 schemas cannot use `anyOf`")
            .with_how_to_fix("Upgrade to OpenAPI 3 or remove `anyOf`")
            .with_category(RuleCategory::Schemas)
            .with_formats(&oas2)
            .unresolved()
            .recommended(),
        Rule::new("oas2-oneOf", "$..[?(@.oneOf)]", "undefined")
            .with_field("oneOf")
            .with_message("`oneOf` is not supported by OpenAPI 2")
            .with_description("OpenAPI 2 schemas cannot use `oneOf`")
            .with_how_to_fix("Upgrade to OpenAPI 3 or remove `oneOf`")
            .with_category(RuleCategory::Schemas)
            .with_formats(&oas2)
            .unresolved()
            .recommended(),
        // examples
        document_rule("oas3-missing-example", "oasExampleMissing")
            .with_description("Schemas, parameters and content should have examples")
            .with_how_to_fix("Add an `example` or `examples` to every schema property, parameter and media type")
            .with_category(RuleCategory::Examples)
            .with_formats(&oas3)
            .recommended(),
        // security
        document_rule("oas3-operation-security-defined", "oasOpSecurityDefined")
            .with_description("Operation security requirements must reference defined schemes")
            .with_how_to_fix("Define the scheme in `components.securitySchemes`")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Security)
            .with_formats(&oas3)
            .recommended(),
        document_rule("oas2-operation-security-defined", "oasOpSecurityDefined")
            .with_description("Operation security requirements must reference defined schemes")
            .with_how_to_fix("Define the scheme in `securityDefinitions`")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Security)
            .with_formats(&oas2)
            .recommended(),
        // validation
        document_rule("oas3-schema", "oasDocumentSchema")
            .with_description("The document must be a structurally valid OpenAPI 3 document")
            .with_how_to_fix("Fix the structural problems reported")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Validation)
            .with_formats(&oas3)
            .unresolved()
            .recommended(),
        document_rule("oas2-schema", "oasDocumentSchema")
            .with_description("The document must be a structurally valid Swagger 2 document")
            .with_how_to_fix("Fix the structural problems reported")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Validation)
            .with_formats(&oas2)
            .unresolved()
            .recommended(),
        document_rule("oas3-api-servers", "oasAPIServers")
            .with_description("The document should define servers with valid URLs")
            .with_how_to_fix("Add a `servers` list")
            .with_category(RuleCategory::Validation)
            .with_formats(&oas3)
            .recommended(),
        Rule::new("oas3-host-not-example", "$.servers[*].url", "pattern")
            .with_options(options([("notMatch", Value::from(r"example\.com"))]))
            .with_message("Server URL `{{value}}` should not point at example.com")
            .with_description("Server URLs should not be example.com")
            .with_how_to_fix("Use the real server address")
            .with_category(RuleCategory::Validation)
            .with_formats(&oas3),
        Rule::new("oas3-server-trailing-slash", "$.servers[*].url", "pattern")
            .with_options(options([("notMatch", Value::from(r"./$"))]))
            .with_message("Server URL `{{value}}` must not end with a slash")
            .with_description("Server URLs must not end with a slash")
            .with_how_to_fix("Remove the trailing slash")
            .with_category(RuleCategory::Validation)
            .with_formats(&oas3)
            .recommended(),
        Rule::new("oas2-api-host", "$", "truthy")
            .with_field("host")
            .with_message("`host` should be defined")
            .with_description("Swagger documents should define a host")
            .with_how_to_fix("Add a `host`")
            .with_severity(Severity::Info)
            .with_category(RuleCategory::Validation)
            .with_formats(&oas2)
            .recommended(),
        Rule::new("oas2-api-schemes", "$", "truthy")
            .with_field("schemes")
            .with_message("`schemes` should be defined and not empty")
            .with_description("Swagger documents should define their schemes")
            .with_how_to_fix("Add a `schemes` list")
            .with_category(RuleCategory::Validation)
            .with_formats(&oas2)
            .recommended(),
        Rule::new("oas2-host-not-example", "$.host", "pattern")
            .with_options(options([("notMatch", Value::from(r"example\.com"))]))
            .with_message("Host `{{value}}` should not be example.com")
            .with_description("The host should not be example.com")
            .with_how_to_fix("Use the real host")
            .with_category(RuleCategory::Validation)
            .with_formats(&oas2),
        Rule::new("oas2-host-trailing-slash", "$.host", "pattern")
            .with_options(options([("notMatch", Value::from(r"/$"))]))
            .with_message("Host `{{value}}` must not end with a slash")
            .with_description("The host must not end with a slash")
            .with_how_to_fix("Remove the trailing slash")
            .with_category(RuleCategory::Validation)
            .with_formats(&oas2)
            .recommended(),
    ];
    rules.into_iter().map(docs).collect()
}

/// The OWASP catalog
pub fn owasp_rules() -> Vec<Rule> {
    let oas3 = SpecFormat::OAS3;
    let owasp = |id: &str, function: &str| {
        Rule::new(id, "$", function)
            .with_category(RuleCategory::Owasp)
            .with_severity(Severity::Error)
            .recommended()
    };
    let unsafe_methods = strings(&["post", "put", "patch", "delete"]);

    let rules = vec![
        owasp("owasp-protection-global-unsafe", "owaspCheckSecurity")
            .with_options(options([
                ("methods", unsafe_methods.clone()),
                ("nullable", Value::Bool(true)),
            ]))
            .with_description("Write operations must be protected by a security scheme")
            .with_how_to_fix("Add `security` to the document or to every write operation"),
        owasp("owasp-protection-global-unsafe-strict", "owaspCheckSecurity")
            .with_options(options([
                ("methods", unsafe_methods),
                ("nullable", Value::Bool(false)),
            ]))
            .with_severity(Severity::Info)
            .with_description("Write operations should not allow anonymous access")
            .with_how_to_fix("Remove empty security requirements from write operations"),
        owasp("owasp-protection-global-safe", "owaspCheckSecurity")
            .with_options(options([
                ("methods", strings(&["get", "head"])),
                ("nullable", Value::Bool(true)),
            ]))
            .with_severity(Severity::Info)
            .with_description("Read operations should be protected by a security scheme")
            .with_how_to_fix("Add `security` to the document or to every read operation"),
        owasp("owasp-define-error-responses-401", "owaspCheckErrorResponse")
            .with_options(options([("code", Value::from("401"))]))
            .with_severity(Severity::Warn)
            .with_description("Operations should describe a 401 response")
            .with_how_to_fix("Add a `401` response with a schema"),
        owasp("owasp-define-error-responses-500", "owaspCheckErrorResponse")
            .with_options(options([("code", Value::from("500"))]))
            .with_severity(Severity::Warn)
            .with_description("Operations should describe a 500 response")
            .with_how_to_fix("Add a `500` response with a schema"),
        owasp("owasp-define-error-responses-429", "owaspCheckErrorResponse")
            .with_options(options([("code", Value::from("429"))]))
            .with_severity(Severity::Warn)
            .with_description("Operations should describe a 429 response")
            .with_how_to_fix("Add a `429` response with a schema"),
        owasp("owasp-define-error-validation", "owaspDefineErrorDefinition")
            .with_options(options([("codes", strings(&["400", "422", "4XX"]))]))
            .with_severity(Severity::Warn)
            .with_description("Operations should describe a validation error response")
            .with_how_to_fix("Add a `400`, `422` or `4XX` response"),
        owasp("owasp-rate-limit", "owaspHeaderDefinition")
            .with_options(options([(
                "headers",
                Value::List(vec![
                    strings(&["X-RateLimit-Limit"]),
                    strings(&["X-Rate-Limit-Limit"]),
                    strings(&["RateLimit-Limit", "RateLimit-Reset"]),
                    strings(&["RateLimit"]),
                ]),
            )]))
            .with_description("Successful responses should carry rate limit headers")
            .with_how_to_fix("Add rate limit headers to 2xx and 4xx responses")
            .with_formats(&oas3),
        owasp("owasp-rate-limit-retry-after", "owaspRatelimitRetryAfter")
            .with_description("429 responses must define a `Retry-After` header")
            .with_how_to_fix("Add a `Retry-After` header to every 429 response")
            .with_formats(&oas3),
        owasp("owasp-array-limit", "owaspArrayLimit")
            .with_description("Array schemas must define `maxItems`")
            .with_how_to_fix("Add `maxItems` to every array schema"),
        owasp("owasp-string-limit", "owaspStringLimit")
            .with_description("String schemas must define `maxLength`, `enum` or `const`")
            .with_how_to_fix("Bound every string schema"),
        Rule::new("owasp-string-restricted", "$..[?(@.type == 'string')]", "schema")
            .with_options(options([(
                "schema",
                options([(
                    "anyOf",
                    Value::List(vec![
                        options([("required", strings(&["format"]))]),
                        options([("required", strings(&["pattern"]))]),
                        options([("required", strings(&["enum"]))]),
                        options([("required", strings(&["const"]))]),
                    ]),
                )]),
            )]))
            .with_message("String schemas should restrict their content with `format`, `pattern`, `enum` or `const`")
            .with_description("String schemas should be restricted")
            .with_how_to_fix("Add a `format`, `pattern`, `enum` or `const`")
            .with_category(RuleCategory::Owasp)
            .recommended(),
        owasp("owasp-integer-limit", "owaspIntegerLimit")
            .with_description("Integer schemas must define a minimum and a maximum")
            .with_how_to_fix("Add `minimum` and `maximum` to every integer schema"),
        owasp("owasp-integer-format", "owaspIntegerFormat")
            .with_description("Integer schemas must define `int32` or `int64` format")
            .with_how_to_fix("Add a `format` to every integer schema"),
        owasp("owasp-no-numeric-ids", "owaspNoNumericIDs")
            .with_description("Resource identifiers should not be guessable integers")
            .with_how_to_fix("Use UUIDs or other random identifiers"),
        owasp("owasp-no-http-basic", "owaspNoBasicAuth")
            .with_description("HTTP basic authentication must not be used")
            .with_how_to_fix("Use a token based scheme"),
        owasp("owasp-auth-insecure-schemes", "owaspAuthInsecureSchemes")
            .with_description("Deprecated or insecure HTTP auth schemes must not be used")
            .with_how_to_fix("Use `bearer` or another modern scheme"),
        owasp("owasp-jwt-best-practices", "owaspJWTBestPractice")
            .with_description("JWT security schemes must mention RFC8725 in their description")
            .with_how_to_fix("Document compliance with RFC8725"),
        Rule::new(
            "owasp-no-api-keys-in-url",
            "$..securitySchemes[?(@.type == 'apiKey')]",
            "pattern",
        )
        .with_field("in")
        .with_options(options([("notMatch", Value::from("^(query|path)$"))]))
        .with_message("API keys must not be passed in the {{value}}")
        .with_description("API keys must not be sent in the URL")
        .with_how_to_fix("Send API keys in a header")
        .with_severity(Severity::Error)
        .with_category(RuleCategory::Owasp)
        .with_formats(&oas3)
        .recommended(),
        Rule::new(
            "owasp-no-credentials-in-url",
            "$..parameters[?(@.in == 'query' || @.in == 'path')]",
            "pattern",
        )
        .with_field("name")
        .with_options(options([(
            "notMatch",
            Value::from(
                r"(?i)^.*(client_?secret|token|access_?token|refresh_?token|id_?token|password|secret|api-?key).*$",
            ),
        )]))
        .with_message("Parameter `{{value}}` looks like a credential and must not be in the URL")
        .with_description("Credentials must not be sent in the URL")
        .with_how_to_fix("Send credentials in a header or the body")
        .with_severity(Severity::Error)
        .with_category(RuleCategory::Owasp)
        .with_formats(&oas3)
        .recommended(),
        Rule::new(
            "owasp-no-additionalProperties",
            "$..[?(@.type == 'object' && @.additionalProperties)]",
            "falsy",
        )
        .with_field("additionalProperties")
        .with_message("Objects should not allow unconstrained additional properties")
        .with_description("`additionalProperties` should be disabled")
        .with_how_to_fix("Set `additionalProperties: false`")
        .with_severity(Severity::Warn)
        .with_category(RuleCategory::Owasp)
        .with_formats(&oas3)
        .recommended(),
        Rule::new(
            "owasp-constrained-additionalProperties",
            "$..[?(@.type == 'object' && @.additionalProperties)]",
            "defined",
        )
        .with_field("maxProperties")
        .with_message("Objects allowing additional properties should define `maxProperties`")
        .with_description("Additional properties should be bounded")
        .with_how_to_fix("Add `maxProperties`")
        .with_severity(Severity::Warn)
        .with_category(RuleCategory::Owasp)
        .with_formats(&oas3)
        .recommended(),
        Rule::new("owasp-security-hosts-https-oas3", "$.servers[*].url", "pattern")
            .with_options(options([("match", Value::from("^https:"))]))
            .with_message("Server URL `{{value}}` must use HTTPS")
            .with_description("Servers must use HTTPS")
            .with_how_to_fix("Serve the API over HTTPS")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Owasp)
            .with_formats(&oas3)
            .recommended(),
    ];
    rules.into_iter().map(docs).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_unique() {
        let ids: Vec<String> = openapi_rules()
            .into_iter()
            .chain(owasp_rules())
            .map(|r| r.id)
            .collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn test_catalog_validates() {
        let catalog = RuleCatalog::builtin();
        let registry = FunctionRegistry::builtin();
        catalog.all_combined().validate(&registry).unwrap();
    }

    #[test]
    fn test_profiles() {
        let catalog = RuleCatalog::builtin();
        let recommended = catalog.recommended();
        let all = catalog.all();
        assert!(recommended.len() < all.len());
        assert!(recommended.get("operation-operationId-unique").is_some());
        assert!(recommended.get("openapi-tags").is_none());
        assert_eq!(
            catalog.profile("vacuum:all").map(|s| s.len()),
            Some(all.len() + catalog.owasp().len())
        );
        assert!(catalog.profile("nope").is_none());
        assert_eq!(
            catalog.find("owasp-no-http-basic").map(|r| r.category),
            Some(RuleCategory::Owasp)
        );
    }

    #[test]
    fn test_rules_have_docs() {
        let catalog = RuleCatalog::builtin();
        let rule = catalog.find("info-contact").unwrap();
        assert_eq!(
            rule.documentation_url.as_deref(),
            Some("https://frost.dev/rules/information/info-contact")
        );
    }
}
