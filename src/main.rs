use skiplist_kv::{LineFormat, Options, SkipList};

fn main() -> skiplist_kv::Result<()> {
    let mut list = SkipList::with_options(Options::new().max_level(6))?;
    list.insert(1, "hello world".to_string());
    list.insert(2, "first program".to_string());
    list.insert(3, "glad to read the paper".to_string());
    list.insert(5, "finish the code".to_string());
    list.insert(8, "today summer".to_string());
    list.insert(13, "2024/6/12".to_string());
    list.insert(21, "tomorrow exam".to_string());
    list.insert(34, "believe myself".to_string());

    println!("skiplist size: {}", list.len());
    println!("{}", list);

    for key in &[1, 34] {
        match list.search(key) {
            Some(value) => println!("found key: {}, value: {}", key, value),
            None => println!("not found key: {}", key),
        }
    }

    for key in &[8, 21] {
        if list.delete(key) {
            println!("deleted key: {}", key);
        } else {
            println!("not found key: {}", key);
        }
    }

    println!("skiplist size: {}", list.len());
    println!("{}", list);
    print!("{}", list.to_lines(&LineFormat::default()));
    Ok(())
}
