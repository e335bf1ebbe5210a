use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_resourcegroupstagging::types::TagFilter as AwsTagFilter;
use tracing::debug;

use crate::resource::filter::{tag_filters, TagFilter};
use crate::resource::{extract_version, ExcludeSet, Finder, FinderError, ResourceQuery};
use crate::types::{Resource, ResourceKind, UNVERSIONED};

const VERSION_TAG: &str = "version";
const RESOURCE_TYPE_FILTER: &str = "lambda";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDetails {
    pub tags: HashMap<String, String>,
    /// Set for container-image packaged functions.
    pub image_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedFunction {
    pub arn: String,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaggedPage {
    pub functions: Vec<TaggedFunction>,
    pub next_token: Option<String>,
}

/// The calls [`LambdaFinder`] needs from AWS.
#[async_trait]
pub trait FunctionApi: Send + Sync {
    /// `Ok(None)` when the function does not exist.
    async fn get_function(&self, name: &str) -> Result<Option<FunctionDetails>>;

    async fn tagged_functions(
        &self,
        filters: &[TagFilter],
        token: Option<&str>,
    ) -> Result<TaggedPage>;
}

pub struct LambdaFinder<A> {
    api: A,
}

impl<A: FunctionApi> LambdaFinder<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    async fn list_tagged(&self, filters: &[TagFilter]) -> Result<Vec<TaggedFunction>> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.api.tagged_functions(filters, token.as_deref()).await?;
            out.extend(page.functions);
            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    /// Tagging results carry no code location, so functions without a
    /// version tag are fetched to read their image.
    async fn untagged_version(&self, name: &str) -> Result<String, FinderError> {
        let details = self
            .api
            .get_function(name)
            .await
            .map_err(|source| FinderError::Lookup {
                kind: ResourceKind::Lambda,
                name: name.to_string(),
                source,
            })?;
        Ok(details
            .as_ref()
            .map(function_version)
            .unwrap_or_else(|| UNVERSIONED.to_string()))
    }
}

#[async_trait]
impl<A: FunctionApi> Finder for LambdaFinder<A> {
    async fn find_by_name(
        &self,
        _query: &ResourceQuery,
        names: &[String],
    ) -> Result<Vec<Resource>, FinderError> {
        let mut out = Vec::new();
        for name in names {
            let details =
                self.api
                    .get_function(name)
                    .await
                    .map_err(|source| FinderError::Lookup {
                        kind: ResourceKind::Lambda,
                        name: name.clone(),
                        source,
                    })?;
            let Some(details) = details else {
                debug!("lambda {name} not found, skipping");
                continue;
            };
            out.push(Resource::new(ResourceKind::Lambda, name).with_version(function_version(&details)));
        }
        Ok(out)
    }

    async fn find_by_filter(
        &self,
        query: &ResourceQuery,
        excluded: &ExcludeSet,
    ) -> Result<Vec<Resource>, FinderError> {
        let filters = tag_filters(&query.tags);
        let tagged = self
            .list_tagged(&filters)
            .await
            .map_err(|source| FinderError::Enumerate {
                kind: ResourceKind::Lambda,
                source,
            })?;

        let mut out = Vec::new();
        for function in tagged {
            let Some(name) = function_name_from_arn(&function.arn) else {
                debug!("skipping unrecognized lambda arn {}", function.arn);
                continue;
            };
            if excluded.is_excluded(name) {
                debug!("lambda {name} excluded");
                continue;
            }
            let version = match tag_version(&function.tags) {
                Some(version) => version,
                None => self.untagged_version(name).await?,
            };
            out.push(Resource::new(ResourceKind::Lambda, name).with_version(version));
        }
        Ok(out)
    }
}

/// `arn:aws:lambda:<region>:<account>:function:<name>[:<qualifier>]` -> `<name>`
pub fn function_name_from_arn(arn: &str) -> Option<&str> {
    let mut parts = arn.splitn(7, ':');
    if parts.next()? != "arn" {
        return None;
    }
    let resource_type = parts.nth(4)?;
    if resource_type != "function" {
        return None;
    }
    let rest = parts.next()?;
    let name = rest.split(':').next().unwrap_or(rest);
    (!name.is_empty()).then_some(name)
}

fn tag_version(tags: &HashMap<String, String>) -> Option<String> {
    tags.get(VERSION_TAG)
        .filter(|v| !v.trim().is_empty())
        .cloned()
}

/// The `version` tag, else the image tag, else `N/A`.
fn function_version(details: &FunctionDetails) -> String {
    tag_version(&details.tags)
        .or_else(|| details.image_uri.as_deref().map(extract_version))
        .unwrap_or_else(|| UNVERSIONED.to_string())
}

/// [`FunctionApi`] backed by the Lambda and Resource Groups Tagging APIs.
pub struct AwsFunctionApi {
    lambda: aws_sdk_lambda::Client,
    tagging: aws_sdk_resourcegroupstagging::Client,
}

impl AwsFunctionApi {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            lambda: aws_sdk_lambda::Client::new(config),
            tagging: aws_sdk_resourcegroupstagging::Client::new(config),
        }
    }
}

#[async_trait]
impl FunctionApi for AwsFunctionApi {
    async fn get_function(&self, name: &str) -> Result<Option<FunctionDetails>> {
        let output = match self.lambda.get_function().function_name(name).send().await {
            Ok(output) => output,
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                if not_found {
                    return Ok(None);
                }
                return Err(err).with_context(|| format!("GetFunction {name}"));
            }
        };

        Ok(Some(FunctionDetails {
            tags: output.tags().cloned().unwrap_or_default(),
            image_uri: output
                .code()
                .and_then(|code| code.image_uri())
                .map(str::to_string),
        }))
    }

    async fn tagged_functions(
        &self,
        filters: &[TagFilter],
        token: Option<&str>,
    ) -> Result<TaggedPage> {
        let aws_filters = filters
            .iter()
            .map(|f| {
                AwsTagFilter::builder()
                    .key(&f.key)
                    .set_values((!f.values.is_empty()).then(|| f.values.clone()))
                    .build()
            })
            .collect::<Vec<_>>();

        let output = self
            .tagging
            .get_resources()
            .set_tag_filters(Some(aws_filters))
            .resource_type_filters(RESOURCE_TYPE_FILTER)
            .set_pagination_token(token.map(str::to_string))
            .send()
            .await
            .context("GetResources for lambda functions")?;

        let functions = output
            .resource_tag_mapping_list()
            .iter()
            .filter_map(|mapping| {
                let arn = mapping.resource_arn()?;
                let tags = mapping
                    .tags()
                    .iter()
                    .map(|t| (t.key().to_string(), t.value().to_string()))
                    .collect();
                Some(TaggedFunction {
                    arn: arn.to_string(),
                    tags,
                })
            })
            .collect();

        Ok(TaggedPage {
            functions,
            next_token: output.pagination_token().map(str::to_string),
        })
    }
}
