use std::collections::HashMap;
use std::future::IntoFuture;

use async_trait::async_trait;
use scoped_dataload::{run, BatchFunction, LoadError};

// Loads movie titles from an in-memory table. Real batch functions would issue one query for
// all of the keys.
struct Titles(HashMap<i64, String>);

#[async_trait]
impl BatchFunction<i64, String> for Titles {
    async fn load(&self, keys: &[i64]) -> anyhow::Result<HashMap<i64, String>> {
        println!("fetching titles for {:?}", keys);
        Ok(keys.iter().filter_map(|k| self.0.get(k).cloned().map(|v| (*k, v))).collect())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), LoadError> {
    let mut table = HashMap::new();
    table.insert(2001, "a space odyssey".to_owned());
    table.insert(7, "samurai".to_owned());
    table.insert(12, "angry men".to_owned());

    run(|scope| async move {
        let titles = scope.loader("titles", Titles(table))?;

        // Both requests are fetched by a single call.
        let (seven, fifteen) =
            futures::join!(titles.load(7).into_future(), titles.load(15).into_future());
        assert_eq!(seven?.as_deref(), Some("samurai"));
        assert_eq!(fifteen?, None);

        // Cached keys are not fetched again.
        assert_eq!(
            titles
                .load_all(vec![12, 2010, 2001, 7])
                .await?
                .iter()
                .map(Option::as_deref)
                .collect::<Vec<_>>(),
            vec![Some("angry men"), None, Some("a space odyssey"), Some("samurai")]
        );
        Ok::<_, LoadError>(())
    })
    .await
}
