pub fn determine_thread_counts_1(total: Option<usize>) -> anyhow::Result<usize> {
    if let Some(total) = total {
        anyhow::Ok(total)
    } else {
        let total = std::thread::available_parallelism();
        if let Ok(total) = total {
            anyhow::Ok(total.get())
        } else {
            println!("Could not autodetect the number of threads available. Setting to 1, but it is better if you specify");
            anyhow::Ok(1)
        }
    }
}

/// Split a total thread budget into (pool workers, htslib threads per job).
pub fn determine_thread_counts_2(
    total: Option<usize>,
    threads_htslib: Option<usize>,
) -> anyhow::Result<(usize, usize)> {
    let threads_htslib = some_min1(threads_htslib)?;
    let total = determine_thread_counts_1(total)?;
    let threads_pool = min1(total.saturating_sub(threads_htslib));
    anyhow::Ok((threads_pool, threads_htslib))
}

pub fn some_min1(t: Option<usize>) -> anyhow::Result<usize> {
    if let Some(t) = t {
        if t < 1 {
            anyhow::bail!("Cannot set number of threads to be negative")
        } else {
            anyhow::Ok(t)
        }
    } else {
        anyhow::Ok(1)
    }
}

pub fn min1(t: usize) -> usize {
    if t < 1 {
        println!("Thread count cannot be negative, so setting to 1");
        1
    } else {
        t
    }
}
