/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::path::{Path, PathBuf};

use swm_aggregation::JobConfig;

use crate::error::{Error, Result};

/// Command line overrides applied on top of the config file.
#[derive(clap::Args, Default, Clone, Debug)]
pub struct Overrides {
    /// Group membership feed.
    #[clap(long, env)]
    pub groups_file: Option<PathBuf>,
    /// User feed.
    #[clap(long, env)]
    pub users_file: Option<PathBuf>,
    /// Start of the reporting interval, in the configured date format.
    #[clap(long, env)]
    pub from: Option<String>,
    /// End of the reporting interval, in the configured date format.
    #[clap(long, env)]
    pub to: Option<String>,
    #[clap(long, env)]
    pub partitions: Option<u16>,
    /// Skip the combine stage.
    #[clap(long)]
    pub no_combine: bool,
}

pub async fn load_config(path: Option<&Path>) -> Result<JobConfig> {
    match path {
        Some(path) => {
            let data = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::ReadFile(path.to_path_buf(), e))?;
            parse_config(path, &data)
        }
        None => Ok(JobConfig::default()),
    }
}

fn parse_config(path: &Path, data: &str) -> Result<JobConfig> {
    serde_yaml::from_str(data).map_err(|e| Error::ParseConfig(path.to_path_buf(), e))
}

impl Overrides {
    pub fn apply(&self, config: &mut JobConfig) {
        if let Some(path) = &self.groups_file {
            config.groups_file = path.clone();
        }
        if let Some(path) = &self.users_file {
            config.users_file = path.clone();
        }
        if let Some(from) = &self.from {
            config.interval.from = Some(from.clone());
        }
        if let Some(to) = &self.to {
            config.interval.to = Some(to.clone());
        }
        if let Some(partitions) = self.partitions {
            config.partitions = partitions;
        }
        if self.no_combine {
            config.combine = false;
        }
    }
}

/// File backing a table: its identifier with `:` replaced, below `dir`.
pub fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{}.cbor", table.replace(':', "_")))
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use swm_aggregation::{JobConfig, StorageInterval};

    use super::{parse_config, table_path, Overrides};
    use crate::error::Error;

    #[test]
    fn parse_partial_config() {
        let config = parse_config(
            Path::new("job.yaml"),
            "
partitions: 3
storage_interval: day
interval:
  from: 01/03/2023
  to: 31/05/2023
top_query_limit: 2
",
        )
        .unwrap();
        assert_eq!(config.partitions, 3);
        assert_eq!(config.storage_interval, StorageInterval::Day);
        assert_eq!(config.interval.from.as_deref(), Some("01/03/2023"));
        assert_eq!(config.interval.format, "%d/%m/%Y");
        assert_eq!(config.top_query_limit, 2);
        assert_eq!(config.column_family, "cf");
        assert!(config.combine);
    }

    #[test]
    fn invalid_config() {
        assert!(matches!(
            parse_config(Path::new("job.yaml"), "storage_interval: minute\n"),
            Err(Error::ParseConfig(..))
        ));
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = JobConfig::default();
        Overrides {
            groups_file: Some(PathBuf::from("/data/groups.csv")),
            to: Some(String::from("30/06/2023")),
            no_combine: true,
            ..Overrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.groups_file, PathBuf::from("/data/groups.csv"));
        assert_eq!(config.users_file, PathBuf::from("users.csv"));
        assert_eq!(config.interval.to.as_deref(), Some("30/06/2023"));
        assert_eq!(config.interval.from, None);
        assert!(!config.combine);
    }

    #[test]
    fn table_files() {
        assert_eq!(
            table_path(Path::new("/data"), "daiad:meter-data"),
            PathBuf::from("/data/daiad_meter-data.cbor")
        );
    }
}
